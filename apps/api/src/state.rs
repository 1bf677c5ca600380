use std::sync::Arc;

use crate::backend::DiaryBackend;
use crate::config::Config;
use crate::errors::AppError;
use crate::sync::SyncEngine;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SyncEngine>,
    /// Same backend the engine writes through. `None` in offline mode.
    pub backend: Option<Arc<dyn DiaryBackend>>,
    pub config: Config,
}

impl AppState {
    /// Backend for review reads and writes; offline mode has none to offer.
    pub fn backend(&self) -> Result<&dyn DiaryBackend, AppError> {
        self.backend.as_deref().ok_or(AppError::Offline)
    }
}
