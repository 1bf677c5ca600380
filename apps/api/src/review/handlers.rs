use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::backend::{Assignment, CounselorComment, DateRange};
use crate::errors::AppError;
use crate::models::diary::{DateCount, ReviewEntry, UrgencyLevel};
use crate::review::ReviewQuery;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CalendarQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Serialize)]
pub struct ReviewListResponse {
    pub entries: Vec<ReviewEntry>,
    pub total: usize,
}

#[derive(Deserialize)]
pub struct CommentRequest {
    pub counselor_memo: String,
    pub is_visible_to_user: bool,
    pub counselor_name: String,
}

#[derive(Deserialize)]
pub struct AssignmentRequest {
    pub assigned_counselor: String,
    /// `null`, absent, or `""` clears the tier.
    pub urgency_level: Option<String>,
}

/// GET /api/v1/diaries
pub async fn handle_list_entries(
    State(state): State<AppState>,
    Query(query): Query<ReviewQuery>,
) -> Result<Json<ReviewListResponse>, AppError> {
    let backend = state.backend()?;
    query.validate().map_err(AppError::Validation)?;
    let rows = backend.list_review_entries(&query.date_range()).await?;
    let entries = query.apply(rows);
    Ok(Json(ReviewListResponse {
        total: entries.len(),
        entries,
    }))
}

/// GET /api/v1/diaries/calendar
/// Counts per day; `from` is exclusive, `to` inclusive.
pub async fn handle_calendar(
    State(state): State<AppState>,
    Query(params): Query<CalendarQuery>,
) -> Result<Json<Vec<DateCount>>, AppError> {
    let backend = state.backend()?;
    let query = ReviewQuery {
        from: params.from,
        to: params.to,
        ..Default::default()
    };
    query.validate().map_err(AppError::Validation)?;
    let range: DateRange = query.date_range();
    Ok(Json(backend.count_entries_by_date(&range).await?))
}

/// PATCH /api/v1/diaries/:id/comment
pub async fn handle_update_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CommentRequest>,
) -> Result<Json<ReviewEntry>, AppError> {
    let backend = state.backend()?;
    let id = parse_entry_id(&id)?;
    let comment = CounselorComment {
        counselor_memo: req.counselor_memo,
        is_visible_to_user: req.is_visible_to_user,
        counselor_name: req.counselor_name,
    };
    let entry = backend.update_counselor_comment(id, &comment).await?;
    info!(
        "Counselor comment saved on {id} (visible to user: {})",
        comment.is_visible_to_user
    );
    Ok(Json(entry))
}

/// PATCH /api/v1/diaries/:id/assignment
pub async fn handle_update_assignment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AssignmentRequest>,
) -> Result<Json<ReviewEntry>, AppError> {
    let backend = state.backend()?;
    let id = parse_entry_id(&id)?;
    let urgency_level = match req.urgency_level.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(UrgencyLevel::parse(raw).ok_or_else(|| {
            AppError::Validation(format!(
                "urgency_level must be high, medium or low, got '{raw}'"
            ))
        })?),
    };
    let assignment = Assignment {
        assigned_counselor: req.assigned_counselor,
        urgency_level,
    };
    let entry = backend.update_assignment(id, &assignment).await?;
    info!(
        "Entry {id} assigned to '{}'",
        assignment.assigned_counselor
    );
    Ok(Json(entry))
}

fn parse_entry_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::Validation(format!("'{raw}' is not a valid entry id")))
}
