//! HTTP and WebSocket server
//!
//! Exposes the chat transport: a WebSocket endpoint carrying the
//! join/leave/message protocol, a small REST surface for session
//! management, and a `/health` liveness endpoint. CORS comes from the
//! configured origin allowlist; an empty list is treated as permissive
//! for development.

mod rest;
mod ws;

pub use ws::ClientEvent;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::HeaderValue,
    response::Json,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::Identity;
use crate::config::Config;
use crate::delivery::DeliveryChannel;
use crate::error::Result;
use crate::orchestrator::Orchestrator;
use crate::sessions::ConnectionRegistry;
use crate::store::SessionStore;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SessionStore>,
    pub connections: Arc<ConnectionRegistry>,
    pub delivery: Arc<DeliveryChannel>,
    pub orchestrator: Arc<Orchestrator>,
    pub identity: Arc<dyn Identity>,
    pub started_at: Instant,
}

/// Build the application router over the given state.
pub fn build_router(state: AppState, config: &Config) -> Router {
    let cors = cors_layer(&config.server.allowed_origins);

    Router::new()
        .route("/health", get(handle_health))
        .route("/ws", get(ws::handle_ws))
        .route("/sessions", post(rest::create_session).get(rest::list_sessions))
        .route(
            "/sessions/{session_id}",
            axum::routing::delete(rest::delete_session),
        )
        .route("/sessions/{session_id}/messages", get(rest::list_messages))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the server until the process is stopped.
pub async fn serve(config: &Config, state: AppState) -> Result<()> {
    let router = build_router(state, config);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "listening");
    axum::serve(listener, router).await?;
    Ok(())
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// GET /health — liveness plus process uptime.
async fn handle_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}
