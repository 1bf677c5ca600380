//! Remote write gateway and review reads against the hosted diary store.
//!
//! `AppState` and the sync engine hold an `Arc<dyn DiaryBackend>`; which
//! implementation is chosen at startup from `Config::backend_mode`.
//! No implementation retries: the next scheduled or manual run is the retry.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::diary::{DateCount, RemoteDiaryRow, ReviewEntry, UrgencyLevel};
use crate::models::user::RemoteUser;

pub mod postgres;
pub mod rest;

pub use postgres::PgBackend;
pub use rest::RestBackend;

pub const DIARY_TABLE: &str = "diary_entries";
pub const USERS_TABLE: &str = "users";
pub const REVIEW_VIEW: &str = "counselor_diary_view";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Inclusive-exclusive bounds are spelled out per method; `None` means open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Annotation a counselor attaches to an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounselorComment {
    pub counselor_memo: String,
    pub is_visible_to_user: bool,
    pub counselor_name: String,
}

/// Case ownership. `urgency_level: None` clears the tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub assigned_counselor: String,
    pub urgency_level: Option<UrgencyLevel>,
}

#[async_trait]
pub trait DiaryBackend: Send + Sync {
    /// Upserts rows keyed on `id`; conflicting rows are overwritten.
    async fn upsert_entries(&self, rows: &[RemoteDiaryRow]) -> Result<(), BackendError>;

    /// Deletes every row whose id is in `ids`, returning how many went away.
    async fn delete_entries(&self, ids: &[String]) -> Result<u64, BackendError>;

    async fn find_or_create_user(&self, line_username: &str) -> Result<RemoteUser, BackendError>;

    /// Review listing from the view, newest first. `from` and `to` are inclusive.
    async fn list_review_entries(&self, range: &DateRange)
        -> Result<Vec<ReviewEntry>, BackendError>;

    /// Entries per day with `from` exclusive and `to` inclusive.
    async fn count_entries_by_date(&self, range: &DateRange)
        -> Result<Vec<DateCount>, BackendError>;

    async fn update_counselor_comment(
        &self,
        id: Uuid,
        comment: &CounselorComment,
    ) -> Result<ReviewEntry, BackendError>;

    async fn update_assignment(
        &self,
        id: Uuid,
        assignment: &Assignment,
    ) -> Result<ReviewEntry, BackendError>;
}

/// Folds per-row dates into sorted day counts.
pub(crate) fn tally_dates<I>(dates: I) -> Vec<DateCount>
where
    I: IntoIterator<Item = String>,
{
    let mut counts = std::collections::BTreeMap::<String, i64>::new();
    for date in dates {
        *counts.entry(date).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(date, count)| DateCount { date, count })
        .collect()
}
