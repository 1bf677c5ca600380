//! PostgREST-dialect HTTP backend (the hosted store's REST surface).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    tally_dates, Assignment, BackendError, CounselorComment, DateRange, DiaryBackend, DIARY_TABLE,
    REVIEW_VIEW, USERS_TABLE,
};
use crate::models::diary::{DateCount, RemoteDiaryRow, ReviewEntry, DIARY_COLUMNS};
use crate::models::user::RemoteUser;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct PostgrestError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    #[allow(dead_code)]
    id: Uuid,
}

#[derive(Debug, Deserialize)]
struct DateOnly {
    date: String,
}

#[derive(Clone)]
pub struct RestBackend {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestBackend {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, BackendError> {
        Ok(Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, self.table_url(table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn fetch_review_entry(&self, id: Uuid) -> Result<ReviewEntry, BackendError> {
        let rows: Vec<ReviewEntry> = checked(
            self.request(Method::GET, REVIEW_VIEW)
                .query(&[("id", format!("eq.{id}")), ("select", "*".to_string())])
                .send()
                .await?,
        )
        .await?
        .json()
        .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound(format!("Diary entry {id} not found")))
    }

    async fn patch_entry(&self, id: Uuid, body: serde_json::Value) -> Result<(), BackendError> {
        checked(
            self.request(Method::PATCH, DIARY_TABLE)
                .query(&[("id", format!("eq.{id}"))])
                .header("Prefer", "return=minimal")
                .json(&body)
                .send()
                .await?,
        )
        .await?;
        Ok(())
    }
}

/// Turns a non-2xx response into `BackendError::Api`, preferring PostgREST's message.
async fn checked(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!("Backend returned {}: {}", status, body);
    Err(BackendError::Api {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<PostgrestError>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.to_string())
}

/// Renders `in.(...)` with every value double-quoted so commas and
/// parentheses inside ids cannot break the list.
fn in_filter(ids: &[String]) -> String {
    let quoted: Vec<String> = ids
        .iter()
        .map(|id| format!("\"{}\"", id.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

fn range_filters(range: &DateRange, from_op: &str) -> Vec<(&'static str, String)> {
    let mut filters = Vec::new();
    if let Some(from) = &range.from {
        filters.push(("date", format!("{from_op}.{from}")));
    }
    if let Some(to) = &range.to {
        filters.push(("date", format!("lte.{to}")));
    }
    filters
}

#[async_trait]
impl DiaryBackend for RestBackend {
    async fn upsert_entries(&self, rows: &[RemoteDiaryRow]) -> Result<(), BackendError> {
        if rows.is_empty() {
            return Ok(());
        }
        // `columns` lets rows without score keys share one bulk payload
        let columns = DIARY_COLUMNS.join(",");
        checked(
            self.request(Method::POST, DIARY_TABLE)
                .query(&[("on_conflict", "id"), ("columns", columns.as_str())])
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(rows)
                .send()
                .await?,
        )
        .await?;
        debug!("Upserted {} diary rows", rows.len());
        Ok(())
    }

    async fn delete_entries(&self, ids: &[String]) -> Result<u64, BackendError> {
        // id is a uuid column: a malformed value would fail the whole filter
        let ids: Vec<String> = ids
            .iter()
            .filter(|id| Uuid::parse_str(id).is_ok())
            .cloned()
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }
        let deleted: Vec<IdOnly> = checked(
            self.request(Method::DELETE, DIARY_TABLE)
                .query(&[("id", in_filter(&ids)), ("select", "id".to_string())])
                .header("Prefer", "return=representation")
                .send()
                .await?,
        )
        .await?
        .json()
        .await?;
        Ok(deleted.len() as u64)
    }

    async fn find_or_create_user(&self, line_username: &str) -> Result<RemoteUser, BackendError> {
        let existing: Vec<RemoteUser> = checked(
            self.request(Method::GET, USERS_TABLE)
                .query(&[
                    ("line_username", format!("eq.{line_username}")),
                    ("select", "*".to_string()),
                    ("limit", "1".to_string()),
                ])
                .send()
                .await?,
        )
        .await?
        .json()
        .await?;
        if let Some(user) = existing.into_iter().next() {
            return Ok(user);
        }

        debug!("No remote user for '{line_username}', creating one");
        let created: Vec<RemoteUser> = checked(
            self.request(Method::POST, USERS_TABLE)
                .header("Prefer", "return=representation")
                .json(&json!([{ "line_username": line_username }]))
                .send()
                .await?,
        )
        .await?
        .json()
        .await?;
        created.into_iter().next().ok_or_else(|| {
            BackendError::UnexpectedResponse("user insert returned no rows".to_string())
        })
    }

    async fn list_review_entries(
        &self,
        range: &DateRange,
    ) -> Result<Vec<ReviewEntry>, BackendError> {
        let mut query = range_filters(range, "gte");
        query.push(("select", "*".to_string()));
        query.push(("order", "created_at.desc".to_string()));
        Ok(checked(
            self.request(Method::GET, REVIEW_VIEW)
                .query(&query)
                .send()
                .await?,
        )
        .await?
        .json()
        .await?)
    }

    async fn count_entries_by_date(
        &self,
        range: &DateRange,
    ) -> Result<Vec<DateCount>, BackendError> {
        let mut query = range_filters(range, "gt");
        query.push(("select", "date".to_string()));
        let rows: Vec<DateOnly> = checked(
            self.request(Method::GET, REVIEW_VIEW)
                .query(&query)
                .send()
                .await?,
        )
        .await?
        .json()
        .await?;
        Ok(tally_dates(rows.into_iter().map(|r| r.date)))
    }

    async fn update_counselor_comment(
        &self,
        id: Uuid,
        comment: &CounselorComment,
    ) -> Result<ReviewEntry, BackendError> {
        self.patch_entry(
            id,
            json!({
                "counselor_memo": comment.counselor_memo,
                "is_visible_to_user": comment.is_visible_to_user,
                "counselor_name": comment.counselor_name,
            }),
        )
        .await?;
        self.fetch_review_entry(id).await
    }

    async fn update_assignment(
        &self,
        id: Uuid,
        assignment: &Assignment,
    ) -> Result<ReviewEntry, BackendError> {
        self.patch_entry(
            id,
            json!({
                "assigned_counselor": assignment.assigned_counselor,
                "urgency_level": assignment.urgency_level.map(|u| u.as_str()).unwrap_or(""),
            }),
        )
        .await?;
        self.fetch_review_entry(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    const ID_A: &str = "6f9619ff-8b86-4d01-b42d-00cf4fc964ff";
    const USER_ID: &str = "11111111-2222-4333-8444-555555555555";

    fn prefer(expected: &'static str) -> impl Fn(&Request) -> bool + Send + Sync {
        move |req: &Request| {
            req.headers
                .get("Prefer")
                .and_then(|v| v.to_str().ok())
                == Some(expected)
        }
    }

    fn row() -> RemoteDiaryRow {
        RemoteDiaryRow {
            id: Uuid::parse_str(ID_A).unwrap(),
            user_id: Uuid::parse_str(USER_ID).unwrap(),
            date: "2024-05-01".to_string(),
            emotion: "怒り".to_string(),
            event: "e".to_string(),
            realization: String::new(),
            self_esteem_score: None,
            worthlessness_score: None,
            created_at: Utc::now(),
            counselor_memo: String::new(),
            is_visible_to_user: false,
            counselor_name: String::new(),
            assigned_counselor: String::new(),
            urgency_level: String::new(),
        }
    }

    #[tokio::test]
    async fn test_upsert_merges_on_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/diary_entries"))
            .and(query_param("on_conflict", "id"))
            .and(query_param("columns", DIARY_COLUMNS.join(",")))
            .and(header("apikey", "key"))
            .and(header("authorization", "Bearer key"))
            .and(prefer("resolution=merge-duplicates,return=minimal"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let backend = RestBackend::new(&server.uri(), "key").unwrap();
        backend.upsert_entries(&[row()]).await.unwrap();
    }

    #[tokio::test]
    async fn test_upsert_failure_carries_postgrest_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/diary_entries"))
            .respond_with(
                ResponseTemplate::new(409)
                    .set_body_json(json!({ "code": "23503", "message": "violates foreign key" })),
            )
            .mount(&server)
            .await;

        let backend = RestBackend::new(&server.uri(), "key").unwrap();
        match backend.upsert_entries(&[row()]).await {
            Err(BackendError::Api { status, message }) => {
                assert_eq!(status, 409);
                assert_eq!(message, "violates foreign key");
            }
            other => panic!("expected an API error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_counts_returned_rows() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/diary_entries"))
            .and(query_param("id", format!("in.(\"{ID_A}\")")))
            .and(query_param("select", "id"))
            .and(prefer("return=representation"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": ID_A }])))
            .expect(1)
            .mount(&server)
            .await;

        let backend = RestBackend::new(&server.uri(), "key").unwrap();
        let ids = vec![ID_A.to_string(), "not-a-uuid".to_string()];
        assert_eq!(backend.delete_entries(&ids).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_without_valid_ids_skips_the_request() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let backend = RestBackend::new(&server.uri(), "key").unwrap();
        let ids = vec!["not-a-uuid".to_string()];
        assert_eq!(backend.delete_entries(&ids).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_find_or_create_user_creates_when_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/users"))
            .and(query_param("line_username", "eq.hanako"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/users"))
            .and(prefer("return=representation"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!([{ "id": USER_ID, "line_username": "hanako" }])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let backend = RestBackend::new(&server.uri(), "key").unwrap();
        let user = backend.find_or_create_user("hanako").await.unwrap();
        assert_eq!(user.id, USER_ID);
        assert_eq!(user.line_username, "hanako");
    }

    #[tokio::test]
    async fn test_find_or_create_user_reuses_existing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": USER_ID,
                "line_username": "hanako",
                "created_at": "2024-05-01T00:00:00Z"
            }])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let backend = RestBackend::new(&server.uri(), "key").unwrap();
        let user = backend.find_or_create_user("hanako").await.unwrap();
        assert_eq!(user.id, USER_ID);
        assert!(user.created_at.is_some());
    }

    #[test]
    fn test_in_filter_quotes_values() {
        let ids = vec!["a".to_string(), "b,c".to_string(), "q\"x".to_string()];
        assert_eq!(in_filter(&ids), r#"in.("a","b,c","q\"x")"#);
    }

    #[test]
    fn test_table_url_trims_trailing_slash() {
        let backend = RestBackend::new("https://example.supabase.co/", "key").unwrap();
        assert_eq!(
            backend.table_url(DIARY_TABLE),
            "https://example.supabase.co/rest/v1/diary_entries"
        );
    }

    #[test]
    fn test_error_message_prefers_postgrest_body() {
        assert_eq!(
            error_message(r#"{"code":"23503","message":"violates foreign key"}"#),
            "violates foreign key"
        );
        assert_eq!(error_message("gateway timeout"), "gateway timeout");
    }

    #[test]
    fn test_range_filters() {
        let range = DateRange {
            from: Some("2024-05-01".to_string()),
            to: Some("2024-05-31".to_string()),
        };
        assert_eq!(
            range_filters(&range, "gt"),
            vec![
                ("date", "gt.2024-05-01".to_string()),
                ("date", "lte.2024-05-31".to_string())
            ]
        );
        assert!(range_filters(&DateRange::default(), "gte").is_empty());
    }
}
