//! Workload listing

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use tracing::debug;

use crate::api::server::AppState;
use crate::error::TailError;

/// List the containers currently running
pub async fn list_containers(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, TailError> {
    let workloads = state.catalog.list_running().await?;
    debug!("Listed {} running containers", workloads.len());
    Ok(Json(workloads))
}
