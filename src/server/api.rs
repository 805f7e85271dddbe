use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::errors::HikeError;
use crate::planner::AutoPlanner;
use crate::planner::llm::ChatModel;
use crate::planner::reports::TripReportSource;
use crate::config::HikeConfig;

use super::dashboard;
use super::db::DbHandle;
use super::ws::ConnectionManager;
use super::{auth, social};

const DEFAULT_ROUTE_LIMIT: i64 = 50;
const MAX_ROUTE_LIMIT: i64 = 500;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub rooms: ConnectionManager,
    pub planner: Arc<AutoPlanner>,
    pub templates: Handlebars<'static>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Wire the planner and templates around an opened database.
    pub fn new(
        db: DbHandle,
        llm: Arc<dyn ChatModel>,
        reports: Option<Arc<dyn TripReportSource>>,
        config: &HikeConfig,
    ) -> anyhow::Result<Self> {
        let rooms = ConnectionManager::new();
        let planner = Arc::new(AutoPlanner::new(
            db.clone(),
            rooms.clone(),
            llm,
            reports,
            config.planner.clone(),
            config.reports.max_reports,
        ));
        Ok(Self {
            db,
            rooms,
            planner,
            templates: dashboard::load_templates()?,
        })
    }
}

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RoutesQuery {
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Deserialize)]
pub struct ChatRequest {
    pub user_message: String,
}

#[derive(Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Internal(String),
}

impl ApiError {
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(m)
            | ApiError::Unauthorized(m)
            | ApiError::Forbidden(m)
            | ApiError::NotFound(m)
            | ApiError::Internal(m) => m,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({"error": self.message()}));
        (self.status(), body).into_response()
    }
}

impl From<HikeError> for ApiError {
    fn from(err: HikeError) -> Self {
        let message = err.to_string();
        match err {
            HikeError::UserNotFound
            | HikeError::GroupNotFound { .. }
            | HikeError::RequestNotFound => ApiError::NotFound(message),
            HikeError::NotMember { .. } | HikeError::Forbidden(_) => ApiError::Forbidden(message),
            HikeError::Unauthorized => ApiError::Unauthorized(message),
            HikeError::Validation(_) => ApiError::BadRequest(message),
        }
    }
}

/// Domain errors travel through `anyhow` from the database layer; anything
/// that is not a `HikeError` is an internal failure.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<HikeError>() {
            Ok(domain) => domain.into(),
            Err(other) => {
                error!(error = %format!("{:#}", other), "Request failed");
                ApiError::Internal("Internal server error".into())
            }
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/routes", get(list_routes))
        .route("/routes/", get(list_routes))
        .route("/routes/search", get(search_routes))
        .route("/trails/search", get(search_routes))
        .route("/chat", post(chat))
        .merge(auth::router())
        .merge(social::router())
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({"message": "HikeBot Backend is Running!"}))
}

async fn health_check() -> &'static str {
    "ok"
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_ROUTE_LIMIT).clamp(1, MAX_ROUTE_LIMIT)
}

async fn list_routes(
    State(state): State<SharedState>,
    Query(query): Query<RoutesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = clamp_limit(query.limit);
    let trails = state.db.call(move |db| db.list_trails(limit)).await?;
    Ok(Json(trails))
}

async fn search_routes(
    State(state): State<SharedState>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let q = query.q;
    let trails = state.db.call(move |db| db.search_trails(&q)).await?;
    Ok(Json(trails))
}

async fn chat(
    State(state): State<SharedState>,
    Json(req): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.user_message.trim().is_empty() {
        return Err(ApiError::BadRequest("user_message is required".into()));
    }
    let reply = state.planner.assistant_reply(&req.user_message).await;
    Ok(Json(ChatResponse { reply }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::db::NewTrail;
    use crate::server::testing::{body_json, test_state};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_app() -> (Router, SharedState) {
        let state = test_state();
        (api_router().with_state(state.clone()), state)
    }

    async fn seed_trails(state: &SharedState, names: &[&str]) {
        let trails: Vec<NewTrail> = names
            .iter()
            .enumerate()
            .map(|(i, name)| NewTrail {
                name: name.to_string(),
                length_km: 1.0 + i as f64,
                ..Default::default()
            })
            .collect();
        state
            .db
            .call(move |db| db.replace_trails("trails", &trails))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_health_check() {
        let (app, _) = test_app();
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_root_message() {
        let (app, _) = test_app();
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["message"], "HikeBot Backend is Running!");
    }

    #[tokio::test]
    async fn test_routes_limit_is_clamped() {
        let (app, state) = test_app();
        seed_trails(&state, &["A", "B", "C"]).await;

        let request = Request::builder()
            .uri("/routes?limit=0")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let trails: Vec<serde_json::Value> = body_json(response.into_body()).await;
        assert_eq!(trails.len(), 1);
        assert_eq!(trails[0]["name"], "A");
        assert_eq!(trails[0]["length_km"], 1.0);

        let request = Request::builder().uri("/routes/").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let trails: Vec<serde_json::Value> = body_json(response.into_body()).await;
        assert_eq!(trails.len(), 3);
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), 50);
        assert_eq!(clamp_limit(Some(-4)), 1);
        assert_eq!(clamp_limit(Some(10_000)), 500);
    }

    #[tokio::test]
    async fn test_search_routes_and_alias() {
        let (app, state) = test_app();
        seed_trails(&state, &["Mount Hollywood", "Fern Dell", "Hollywood Sign"]).await;

        for uri in ["/routes/search?q=HOLLY", "/trails/search?q=holly"] {
            let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            let trails: Vec<serde_json::Value> = body_json(response.into_body()).await;
            assert_eq!(trails.len(), 2, "{}", uri);
        }

        let request = Request::builder()
            .uri("/routes/search?q=")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let trails: Vec<serde_json::Value> = body_json(response.into_body()).await;
        assert!(trails.is_empty());
    }

    #[tokio::test]
    async fn test_chat_reports_offline_assistant() {
        let (app, _) = test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({"user_message": "what socks should I wear?"}).to_string(),
            ))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: ChatResponse = body_json(response.into_body()).await;
        assert!(body.reply.contains("offline"));
    }

    #[tokio::test]
    async fn test_chat_rejects_empty_message() {
        let (app, _) = test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::json!({"user_message": "  "}).to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["error"], "user_message is required");
    }

    #[test]
    fn test_hike_error_status_mapping() {
        let cases = [
            (HikeError::UserNotFound, StatusCode::NOT_FOUND),
            (HikeError::NotMember { group_id: "g".into() }, StatusCode::FORBIDDEN),
            (HikeError::Unauthorized, StatusCode::UNAUTHORIZED),
            (HikeError::Validation("bad".into()), StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_anyhow_downcasts_domain_errors() {
        let err: anyhow::Error = HikeError::RequestNotFound.into();
        let api = ApiError::from(err);
        assert_eq!(api.status(), StatusCode::NOT_FOUND);
        assert_eq!(api.message(), "Request not found");

        let api = ApiError::from(anyhow::anyhow!("disk I/O error"));
        assert_eq!(api.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!api.message().contains("disk"));
    }
}
