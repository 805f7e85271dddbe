//! Layered configuration for HikeBot.
//!
//! Reads an optional `hikebot.toml`, then applies environment overrides, then
//! CLI flags (applied by `main`).
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8000
//! db_path = ".hikebot/hikebot.db"
//!
//! [llm]
//! base_url = "http://localhost:11434/v1"
//! model = "llama3.2"
//!
//! [reports]
//! enabled = true
//! max_reports = 3
//!
//! [planner]
//! catalog_threshold = 70
//! builtin_threshold = 50
//!
//! [seed]
//! default_places = ["Griffith Park, Los Angeles, USA"]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "hikebot.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    /// Allow any origin. Only meant for local frontend development.
    pub cors_permissive: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            db_path: PathBuf::from(".hikebot/hikebot.db"),
            cors_permissive: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            api_key: "ollama".to_string(),
            model: "llama3.2".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    pub enabled: bool,
    pub base_url: String,
    pub max_reports: usize,
    pub timeout_secs: u64,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://www.wta.org".to_string(),
            max_reports: 3,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerSettings {
    /// Minimum score (exclusive) for a match against the seeded catalog.
    pub catalog_threshold: u8,
    /// Minimum score (exclusive) for a match against the built-in trails.
    pub builtin_threshold: u8,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            catalog_threshold: 70,
            builtin_threshold: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedSettings {
    pub overpass_url: String,
    pub nominatim_url: String,
    pub cache_dir: PathBuf,
    pub default_places: Vec<String>,
}

impl Default for SeedSettings {
    fn default() -> Self {
        Self {
            overpass_url: "https://overpass-api.de/api/interpreter".to_string(),
            nominatim_url: "https://nominatim.openstreetmap.org/search".to_string(),
            cache_dir: PathBuf::from(".hikebot/cache"),
            default_places: vec!["Griffith Park, Los Angeles, USA".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HikeConfig {
    pub server: ServerSettings,
    pub llm: LlmSettings,
    pub reports: ReportSettings,
    pub planner: PlannerSettings,
    pub seed: SeedSettings,
}

impl HikeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse hikebot.toml")
    }

    /// Load the file if given (or if `hikebot.toml` exists in the working
    /// directory), then apply environment overrides.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply environment overrides through `lookup` so tests can inject values.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HIKEBOT_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("HIKEBOT_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(db) = lookup("HIKEBOT_DB") {
            self.server.db_path = PathBuf::from(db);
        }
        if let Some(url) = lookup("LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(key) = lookup("LLM_API_KEY") {
            self.llm.api_key = key;
        }
        if let Some(model) = lookup("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(enabled) = lookup("HIKEBOT_REPORTS_ENABLED") {
            self.reports.enabled = enabled != "false" && enabled != "0";
        }
    }

    /// Return human-readable problems with the configuration.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.planner.catalog_threshold > 100 || self.planner.builtin_threshold > 100 {
            problems.push("planner thresholds must be between 0 and 100".to_string());
        }
        if self.llm.model.trim().is_empty() {
            problems.push("llm.model must not be empty".to_string());
        }
        if self.reports.max_reports == 0 {
            problems.push("reports.max_reports must be at least 1".to_string());
        }
        problems
    }
}
