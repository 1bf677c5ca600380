use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::backend::BackendError;
use crate::sync::SyncError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No backend configured")]
    Offline,

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Backend error: {0}")]
    Backend(BackendError),
}

impl From<BackendError> for AppError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::NotFound(msg) => AppError::NotFound(msg),
            other => AppError::Backend(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Offline => (
                StatusCode::SERVICE_UNAVAILABLE,
                "OFFLINE",
                "No diary backend is configured".to_string(),
            ),
            AppError::Sync(SyncError::AlreadyRunning) => (
                StatusCode::CONFLICT,
                "SYNC_IN_PROGRESS",
                "A sync is already in progress, retry later".to_string(),
            ),
            AppError::Sync(SyncError::Identity(e)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "IDENTITY_ERROR",
                e.to_string(),
            ),
            AppError::Sync(SyncError::PartialDelete(report)) => {
                tracing::error!("Partial delete: {report}");
                (
                    StatusCode::BAD_GATEWAY,
                    "PARTIAL_DELETE",
                    report.to_string(),
                )
            }
            AppError::Sync(SyncError::Backend(e)) | AppError::Backend(e) => {
                tracing::error!("Backend error: {e}");
                (
                    StatusCode::BAD_GATEWAY,
                    "BACKEND_ERROR",
                    "The diary backend rejected the request".to_string(),
                )
            }
            AppError::Sync(SyncError::Store(e)) => {
                tracing::error!("Local store error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORE_ERROR",
                    "A local storage error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{DeleteReport, IdentityError};

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::Sync(SyncError::AlreadyRunning), StatusCode::CONFLICT),
            (
                AppError::Sync(SyncError::Identity(IdentityError::MissingUsername)),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                AppError::Sync(SyncError::PartialDelete(DeleteReport::default())),
                StatusCode::BAD_GATEWAY,
            ),
            (AppError::Offline, StatusCode::SERVICE_UNAVAILABLE),
            (
                AppError::from(BackendError::NotFound("x".to_string())),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::from(BackendError::Api {
                    status: 500,
                    message: "boom".to_string(),
                }),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
