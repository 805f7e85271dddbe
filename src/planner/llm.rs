use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmSettings;
use crate::errors::LlmError;

/// One chat turn sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Abstraction over chat-completion backends.
/// Real implementation: `OpenAiClient`. Tests use scripted fakes.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Ask for a JSON object response and parse it.
    async fn complete_json(
        &self,
        messages: &[ChatTurn],
        temperature: f32,
    ) -> Result<serde_json::Value, LlmError>;

    /// Ask for a free-text response.
    async fn complete_text(&self, messages: &[ChatTurn], temperature: f32) -> Result<String, LlmError>;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint (Ollama,
/// vLLM, OpenAI itself).
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(settings: &LlmSettings) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
        })
    }

    async fn complete(
        &self,
        messages: &[ChatTurn],
        temperature: f32,
        json_mode: bool,
    ) -> Result<String, LlmError> {
        let body = CompletionRequest {
            model: &self.model,
            messages,
            temperature,
            response_format: json_mode.then(|| serde_json::json!({"type": "json_object"})),
        };
        let url = format!("{}/chat/completions", self.base_url);
        debug!(url = %url, model = %self.model, json_mode, "LLM request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse = response.json().await?;
        extract_content(parsed)
    }
}

fn extract_content(response: CompletionResponse) -> Result<String, LlmError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or(LlmError::EmptyResponse)
}

/// Parse model output as a JSON object, tolerating prose or code fences
/// around it.
pub fn parse_json_reply(content: &str) -> Result<serde_json::Value, LlmError> {
    let trimmed = content.trim();
    let cleaned = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => trimmed,
    };
    Ok(serde_json::from_str(cleaned)?)
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn complete_json(
        &self,
        messages: &[ChatTurn],
        temperature: f32,
    ) -> Result<serde_json::Value, LlmError> {
        let content = self.complete(messages, temperature, true).await?;
        parse_json_reply(&content)
    }

    async fn complete_text(&self, messages: &[ChatTurn], temperature: f32) -> Result<String, LlmError> {
        self.complete(messages, temperature, false).await
    }
}
