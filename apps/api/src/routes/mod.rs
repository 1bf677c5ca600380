pub mod health;

use axum::{
    routing::{delete, get, patch, post, put},
    Router,
};

use crate::review::handlers as review;
use crate::state::AppState;
use crate::sync::handlers as sync;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Sync API
        .route("/api/v1/sync", post(sync::handle_run_sync))
        .route("/api/v1/sync/manual", post(sync::handle_manual_sync))
        .route("/api/v1/sync/status", get(sync::handle_sync_status))
        .route("/api/v1/sync/enabled", put(sync::handle_set_enabled))
        // Review API
        .route("/api/v1/diaries", get(review::handle_list_entries))
        .route("/api/v1/diaries/calendar", get(review::handle_calendar))
        .route("/api/v1/diaries/bulk-delete", post(sync::handle_bulk_delete))
        .route("/api/v1/diaries/:id", delete(sync::handle_delete_entry))
        .route(
            "/api/v1/diaries/:id/comment",
            patch(review::handle_update_comment),
        )
        .route(
            "/api/v1/diaries/:id/assignment",
            patch(review::handle_update_assignment),
        )
        .with_state(state)
}
