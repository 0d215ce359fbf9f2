//! API route definitions

use axum::routing::get;
use axum::Router;
use tower_http::services::{ServeDir, ServeFile};

use super::handlers;
use super::server::AppState;
use super::websocket;

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    let static_dir = state.config.api.static_dir.clone();

    Router::new()
        // Health check
        .route("/health", get(handlers::health::health_check))
        .route("/api/status", get(handlers::health::status))
        // Workloads
        .route("/api/containers", get(handlers::workloads::list_containers))
        // WebSocket endpoints
        .route("/ws/:container_id", get(websocket::logs::logs_ws))
        // Viewer shell and assets
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        .nest_service("/static", ServeDir::new(static_dir))
        .with_state(state)
}
