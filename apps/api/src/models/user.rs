use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A `users` row. `id` stays a string until identity resolution has checked its shape.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RemoteUser {
    pub id: String,
    pub line_username: String,
    pub created_at: Option<DateTime<Utc>>,
}
