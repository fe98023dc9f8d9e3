//! Reconciliation job endpoints
//!
//! Thin wrappers over the orchestrator: start returns 202 with the
//! pending job, status reflects the last persisted counters, cancel is a
//! request the worker honors at its next entry boundary.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::error::ApiResult;
use crate::models::SyncJob;
use crate::AppState;

/// POST /sync/{user_id}/start
pub async fn start_sync(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<(StatusCode, Json<SyncJob>)> {
    let job = state.orchestrator.start(user_id).await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// GET /sync/{user_id}/status
pub async fn sync_status(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<SyncJob>> {
    let job = state.orchestrator.status(user_id).await?;
    Ok(Json(job))
}

/// POST /sync/{user_id}/cancel
pub async fn cancel_sync(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<SyncJob>> {
    let job = state.orchestrator.cancel(user_id).await?;
    Ok(Json(job))
}

pub fn sync_routes() -> Router<AppState> {
    Router::new()
        .route("/sync/:user_id/start", post(start_sync))
        .route("/sync/:user_id/status", get(sync_status))
        .route("/sync/:user_id/cancel", post(cancel_sync))
}
