use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::state::AppState;
use crate::sync::{DeleteReport, SyncOutcome, SyncStatus};

#[derive(Serialize)]
pub struct SyncStatusResponse {
    #[serde(flatten)]
    pub status: SyncStatus,
    pub interval_secs: u64,
}

#[derive(Deserialize)]
pub struct SetEnabledRequest {
    pub enabled: bool,
}

#[derive(Deserialize)]
pub struct BulkDeleteRequest {
    pub ids: Vec<String>,
}

/// GET /api/v1/sync/status
pub async fn handle_sync_status(State(state): State<AppState>) -> Json<SyncStatusResponse> {
    Json(SyncStatusResponse {
        status: state.engine.status(),
        interval_secs: state.config.sync_interval_secs,
    })
}

/// POST /api/v1/sync
pub async fn handle_run_sync(
    State(state): State<AppState>,
) -> Result<Json<SyncOutcome>, AppError> {
    Ok(Json(state.engine.run_sync().await?))
}

/// POST /api/v1/sync/manual
/// Re-sends every local entry, not just the ones uploaded since startup.
pub async fn handle_manual_sync(
    State(state): State<AppState>,
) -> Result<Json<SyncOutcome>, AppError> {
    Ok(Json(state.engine.trigger_manual_sync().await?))
}

/// PUT /api/v1/sync/enabled
pub async fn handle_set_enabled(
    State(state): State<AppState>,
    Json(req): Json<SetEnabledRequest>,
) -> Result<Json<SyncStatusResponse>, AppError> {
    state.engine.set_enabled(req.enabled)?;
    Ok(handle_sync_status(State(state)).await)
}

/// DELETE /api/v1/diaries/:id
pub async fn handle_delete_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteReport>, AppError> {
    if id.trim().is_empty() {
        return Err(AppError::Validation("id must not be empty".to_string()));
    }
    Ok(Json(state.engine.delete_one(&id).await?))
}

/// POST /api/v1/diaries/bulk-delete
pub async fn handle_bulk_delete(
    State(state): State<AppState>,
    Json(req): Json<BulkDeleteRequest>,
) -> Result<Json<DeleteReport>, AppError> {
    if req.ids.iter().any(|id| id.trim().is_empty()) {
        return Err(AppError::Validation("ids must not be empty".to_string()));
    }
    Ok(Json(state.engine.delete_many(&req.ids).await?))
}
