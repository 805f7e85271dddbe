use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    body::Body,
    extract::Path,
    http::{StatusCode, header},
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::HikeConfig;
use crate::planner::llm::{ChatModel, OpenAiClient};
use crate::planner::reports::{TripReportSource, WtaClient};

use super::api::{self, AppState, SharedState};
use super::dashboard;
use super::db::{DbHandle, HikeDb};
use super::embedded::Assets;
use super::ws;

/// Build the full application router: JSON API, room sockets, dashboard
/// pages and static assets.
pub fn build_router(state: SharedState) -> Router {
    api::api_router()
        .merge(dashboard::router())
        .route("/app/", get(|| async { Redirect::permanent("/app") }))
        .route("/ws/groups/{group_id}", get(ws::group_ws_handler))
        .route("/static/{*path}", get(static_handler))
        .with_state(state)
}

async fn static_handler(Path(path): Path<String>) -> Response {
    match Assets::get(&path) {
        Some(content) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            (
                [(header::CONTENT_TYPE, mime.as_ref().to_string())],
                Body::from(content.data.into_owned()),
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}

/// Open (and migrate) the database at the configured path.
pub fn open_database(config: &HikeConfig) -> Result<DbHandle> {
    let db = HikeDb::new(&config.server.db_path)
        .with_context(|| format!("Failed to open database at {}", config.server.db_path.display()))?;
    Ok(DbHandle::new(db))
}

/// Assemble the shared state with the live LLM and trip-report clients.
pub fn build_state(config: &HikeConfig) -> Result<SharedState> {
    let db = open_database(config)?;
    let llm: Arc<dyn ChatModel> =
        Arc::new(OpenAiClient::new(&config.llm).context("Failed to build LLM client")?);
    let reports: Option<Arc<dyn TripReportSource>> = if config.reports.enabled {
        Some(Arc::new(
            WtaClient::new(&config.reports).context("Failed to build trip report client")?,
        ))
    } else {
        None
    };
    info!(
        llm = %config.llm.base_url,
        model = %config.llm.model,
        reports = config.reports.enabled,
        "Planner configured"
    );
    Ok(Arc::new(AppState::new(db, llm, reports, config)?))
}

/// Start the HTTP server and run until Ctrl-C.
pub async fn start_server(config: HikeConfig) -> Result<()> {
    let state = build_state(&config)?;
    let mut app = build_router(state);

    if config.server.cors_permissive {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(address = %local_addr, db = %config.server.db_path.display(), "HikeBot server running");
    info!("Dashboard at http://{}/app", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}
