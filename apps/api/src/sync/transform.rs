use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::diary::{
    DiaryEntry, Emotion, RemoteDiaryRow, ScoreValue, UrgencyLevel, UNKNOWN_EMOTION,
};

/// Score written when a scored emotion has no usable value.
pub const DEFAULT_SCORE: i32 = 50;

/// Maps a local entry onto the remote row shape. No field is ever null;
/// scores appear only for scored emotions, and urgency only as a known tier.
pub fn to_remote_row(
    entry: &DiaryEntry,
    id: Uuid,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> RemoteDiaryRow {
    let scored = Emotion::from_label(&entry.emotion).is_some_and(Emotion::is_scored);
    let emotion = if entry.emotion.is_empty() {
        UNKNOWN_EMOTION.to_string()
    } else {
        entry.emotion.clone()
    };
    let date = if entry.date.is_empty() {
        now.format("%Y-%m-%d").to_string()
    } else {
        entry.date.clone()
    };

    RemoteDiaryRow {
        id,
        user_id,
        date,
        emotion,
        event: entry.event.clone(),
        realization: entry.realization.clone(),
        self_esteem_score: scored.then(|| score_or_default(&entry.self_esteem_score)),
        worthlessness_score: scored.then(|| score_or_default(&entry.worthlessness_score)),
        created_at: parse_timestamp(entry.created_at.as_deref()).unwrap_or(now),
        counselor_memo: entry.counselor_memo.clone().unwrap_or_default(),
        is_visible_to_user: entry.is_visible_to_user.unwrap_or(false),
        counselor_name: entry.counselor_name.clone().unwrap_or_default(),
        assigned_counselor: entry.assigned_counselor.clone().unwrap_or_default(),
        urgency_level: entry
            .urgency_level
            .as_deref()
            .and_then(UrgencyLevel::parse)
            .map(|u| u.as_str().to_string())
            .unwrap_or_default(),
    }
}

fn score_or_default(score: &Option<ScoreValue>) -> i32 {
    score
        .as_ref()
        .and_then(ScoreValue::as_integer)
        .unwrap_or(DEFAULT_SCORE)
}

fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value?)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
