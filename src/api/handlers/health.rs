//! Health and status endpoints

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::api::server::AppState;

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "tailhub"
        })),
    )
}

/// Uptime and per-workload hub state
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let hubs = state.registry.stats();
    let viewers: usize = hubs.iter().map(|h| h.subscribers).sum();

    Json(json!({
        "status": "ok",
        "started_at": state.started_at,
        "uptime_seconds": state.uptime().as_secs(),
        "viewers": viewers,
        "hubs": hubs,
    }))
}
