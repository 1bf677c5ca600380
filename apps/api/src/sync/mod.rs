// Auto-sync: reconciles locally stored diary entries with the hosted store.
// Classification lives in dedup, row mapping in transform, the lifecycle in engine.
// All remote writes go through backend::DiaryBackend.

pub mod dedup;
pub mod engine;
pub mod handlers;
pub mod identity;
pub mod scheduler;
pub mod transform;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::backend::BackendError;
use crate::store::StoreError;

pub use engine::SyncEngine;
pub use identity::IdentityError;

/// Ids per remote delete call.
pub const DELETE_CHUNK_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("a sync is already in progress")]
    AlreadyRunning,

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("local store error: {0}")]
    Store(#[from] StoreError),

    #[error("partial delete: {0}")]
    PartialDelete(DeleteReport),
}

/// Counts for one upload run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub total: usize,
    pub uploaded: usize,
    pub invalid: usize,
    pub duplicates: usize,
    pub already_processed: usize,
    pub repaired: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// No backend configured; nothing was attempted.
    Offline,
    Synced(SyncReport),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub requested: usize,
    pub deleted: u64,
    pub chunks: usize,
    pub failed_chunks: usize,
}

impl DeleteReport {
    pub fn is_complete(&self) -> bool {
        self.failed_chunks == 0
    }
}

impl fmt::Display for DeleteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} batches failed, {}/{} rows deleted",
            self.failed_chunks, self.chunks, self.deleted, self.requested
        )
    }
}

/// Point-in-time view of the engine for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub offline: bool,
    pub enabled: bool,
    pub in_progress: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub processed_ids: usize,
    pub processed_keys: usize,
    pub runs: u64,
    pub current_user: Option<String>,
}
