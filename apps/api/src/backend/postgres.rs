//! Direct PostgreSQL backend for deployments that can reach the database.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use super::{
    Assignment, BackendError, CounselorComment, DateRange, DiaryBackend, DIARY_TABLE, REVIEW_VIEW,
};
use crate::models::diary::{DateCount, RemoteDiaryRow, ReviewEntry, DIARY_COLUMNS};
use crate::models::user::RemoteUser;

/// Rows per INSERT statement; keeps bind parameters well under Postgres' 65535 limit.
const UPSERT_STATEMENT_ROWS: usize = 1000;

#[derive(Clone)]
pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_review_entry(&self, id: Uuid) -> Result<ReviewEntry, BackendError> {
        let sql = format!("SELECT * FROM {REVIEW_VIEW} WHERE id = $1");
        sqlx::query_as::<_, ReviewEntry>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| BackendError::NotFound(format!("Diary entry {id} not found")))
    }
}

fn upsert_conflict_clause() -> String {
    let updates: Vec<String> = DIARY_COLUMNS
        .iter()
        .filter(|c| **c != "id")
        .map(|c| format!("{c} = EXCLUDED.{c}"))
        .collect();
    format!(" ON CONFLICT (id) DO UPDATE SET {}", updates.join(", "))
}

/// Ids as the uuid column sees them; anything unparseable can never match.
fn parse_uuids(ids: &[String]) -> Vec<Uuid> {
    ids.iter()
        .filter_map(|id| Uuid::parse_str(id).ok())
        .collect()
}

fn push_date_range(qb: &mut QueryBuilder<'_, Postgres>, range: &DateRange, from_op: &str) {
    if let Some(from) = &range.from {
        qb.push(format!(" AND date {from_op} "));
        qb.push_bind(from.clone());
    }
    if let Some(to) = &range.to {
        qb.push(" AND date <= ");
        qb.push_bind(to.clone());
    }
}

#[async_trait]
impl DiaryBackend for PgBackend {
    async fn upsert_entries(&self, rows: &[RemoteDiaryRow]) -> Result<(), BackendError> {
        if rows.is_empty() {
            return Ok(());
        }
        let conflict = upsert_conflict_clause();
        let mut tx = self.pool.begin().await?;
        for chunk in rows.chunks(UPSERT_STATEMENT_ROWS) {
            let mut qb = QueryBuilder::<Postgres>::new(format!(
                "INSERT INTO {DIARY_TABLE} ({}) ",
                DIARY_COLUMNS.join(", ")
            ));
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(row.id)
                    .push_bind(row.user_id)
                    .push_bind(row.date.clone())
                    .push_bind(row.emotion.clone())
                    .push_bind(row.event.clone())
                    .push_bind(row.realization.clone())
                    .push_bind(row.self_esteem_score)
                    .push_bind(row.worthlessness_score)
                    .push_bind(row.created_at)
                    .push_bind(row.counselor_memo.clone())
                    .push_bind(row.is_visible_to_user)
                    .push_bind(row.counselor_name.clone())
                    .push_bind(row.assigned_counselor.clone())
                    .push_bind(row.urgency_level.clone());
            });
            qb.push(&conflict);
            qb.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        debug!("Upserted {} diary rows", rows.len());
        Ok(())
    }

    async fn delete_entries(&self, ids: &[String]) -> Result<u64, BackendError> {
        let ids = parse_uuids(ids);
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!("DELETE FROM {DIARY_TABLE} WHERE id = ANY($1)");
        let result = sqlx::query(&sql)
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn find_or_create_user(&self, line_username: &str) -> Result<RemoteUser, BackendError> {
        Ok(sqlx::query_as::<_, RemoteUser>(
            r#"
            INSERT INTO users (line_username)
            VALUES ($1)
            ON CONFLICT (line_username) DO UPDATE SET line_username = EXCLUDED.line_username
            RETURNING id::text AS id, line_username, created_at
            "#,
        )
        .bind(line_username)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn list_review_entries(
        &self,
        range: &DateRange,
    ) -> Result<Vec<ReviewEntry>, BackendError> {
        let mut qb =
            QueryBuilder::<Postgres>::new(format!("SELECT * FROM {REVIEW_VIEW} WHERE TRUE"));
        push_date_range(&mut qb, range, ">=");
        qb.push(" ORDER BY created_at DESC");
        Ok(qb
            .build_query_as::<ReviewEntry>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count_entries_by_date(
        &self,
        range: &DateRange,
    ) -> Result<Vec<DateCount>, BackendError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT date, COUNT(*) AS count FROM {REVIEW_VIEW} WHERE TRUE"
        ));
        push_date_range(&mut qb, range, ">");
        qb.push(" GROUP BY date ORDER BY date");
        Ok(qb
            .build_query_as::<DateCount>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_counselor_comment(
        &self,
        id: Uuid,
        comment: &CounselorComment,
    ) -> Result<ReviewEntry, BackendError> {
        let sql = format!(
            "UPDATE {DIARY_TABLE} SET counselor_memo = $1, is_visible_to_user = $2, counselor_name = $3 WHERE id = $4"
        );
        let result = sqlx::query(&sql)
            .bind(&comment.counselor_memo)
            .bind(comment.is_visible_to_user)
            .bind(&comment.counselor_name)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(BackendError::NotFound(format!("Diary entry {id} not found")));
        }
        self.fetch_review_entry(id).await
    }

    async fn update_assignment(
        &self,
        id: Uuid,
        assignment: &Assignment,
    ) -> Result<ReviewEntry, BackendError> {
        let sql = format!(
            "UPDATE {DIARY_TABLE} SET assigned_counselor = $1, urgency_level = $2 WHERE id = $3"
        );
        let result = sqlx::query(&sql)
            .bind(&assignment.assigned_counselor)
            .bind(assignment.urgency_level.map(|u| u.as_str()).unwrap_or(""))
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(BackendError::NotFound(format!("Diary entry {id} not found")));
        }
        self.fetch_review_entry(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_clause_overwrites_every_non_key_column() {
        let clause = upsert_conflict_clause();
        assert!(clause.starts_with(" ON CONFLICT (id) DO UPDATE SET user_id = EXCLUDED.user_id"));
        assert!(clause.contains("urgency_level = EXCLUDED.urgency_level"));
        assert!(!clause.contains("id = EXCLUDED.id,"));
        assert_eq!(clause.matches("EXCLUDED.").count(), DIARY_COLUMNS.len() - 1);
    }

    #[test]
    fn test_delete_ids_match_regardless_of_case() {
        let upper = "6F9619FF-8B86-4D01-B42D-00CF4FC964FF".to_string();
        let ids = parse_uuids(&[upper, "not-a-uuid".to_string()]);
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].to_string(), "6f9619ff-8b86-4d01-b42d-00cf4fc964ff");
    }
}
