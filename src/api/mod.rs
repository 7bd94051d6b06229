//! Progress API server.
//!
//! Read-only HTTP surface over the progress subsystem:
//!
//! - `GET /health`: liveness check
//! - `GET /progress`: snapshot of every episode currently downloading
//! - `GET /progress/:episode_id`: progress for one episode
//! - `GET /ws`: WebSocket stream of progress snapshots driven by the
//!   pub/sub channel
//!
//! All mutation happens through the library API; the server only reads.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::Database;
use crate::error::Error;
use crate::progress::{ProgressChannel, ProgressTracker, report};
use crate::types::EpisodeId;

mod ws;

#[cfg(test)]
mod tests;

/// Shared application state accessible to all route handlers
///
/// Cloned per request; every field is a cheap handle.
#[derive(Clone)]
pub struct AppState {
    /// Persistence handle
    pub db: Database,
    /// Progress record reader
    pub tracker: ProgressTracker,
    /// Pub/sub channel the WebSocket route subscribes to
    pub channel: ProgressChannel,
    /// Server-wide shutdown token; cancelling it closes WebSocket sessions
    pub cancel: CancellationToken,
    /// Crate configuration
    pub config: Arc<Config>,
}

/// Create the progress API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/progress", get(list_progress))
        .route("/progress/:episode_id", get(episode_progress))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Start the progress API server on the configured bind address
///
/// Runs until the state's cancellation token fires.
pub async fn start_api_server(state: AppState) -> crate::error::Result<()> {
    let bind_address = state.config.api.bind_address;
    let cancel = state.cancel.clone();

    let app = create_router(state);
    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;
    tracing::info!(address = %bind_address, "Progress API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("Progress API stopped");
    Ok(())
}

/// GET /health
async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /progress: everything currently downloading
async fn list_progress(State(state): State<AppState>) -> Response {
    match report::in_progress_items(&state.db, &state.tracker).await {
        Ok(items) => Json(crate::types::ProgressEnvelope {
            progress_items: items,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /progress/:episode_id: one episode, `null` when it is not downloading
async fn episode_progress(
    State(state): State<AppState>,
    Path(episode_id): Path<EpisodeId>,
) -> Response {
    match report::episode_item(&state.db, &state.tracker, episode_id).await {
        Ok(item) => Json(item).into_response(),
        Err(e) => error_response(e),
    }
}

fn error_response(e: Error) -> Response {
    let status = match &e {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %e, "Progress API request failed");
    }
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}
