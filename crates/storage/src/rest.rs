//! Adapter for a hosted PostgREST-style data store.
//!
//! Collections map to `/rest/v1/<collection>`; provisioning calls the
//! `provision_<collection>` remote procedure, which the backend owner deploys.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use telemetry_core::model::{EnrollmentId, EnrollmentRecord, Event, PageView, SessionSnapshot, UserId};
use telemetry_core::statistics::UserStatistics;
use tracing::{debug, info};

use crate::repository::{
    Collection, EnrollmentRepository, EventRepository, PageViewRepository, ProfileRepository,
    SchemaProvisioner, SessionRepository, Storage, StorageError,
};

/// PostgREST codes for "relation does not exist" and "table not in schema cache".
const MISSING_RELATION_CODES: [&str; 2] = ["42P01", "PGRST205"];

#[derive(Clone, Debug)]
pub struct RestConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl RestConfig {
    /// Read `TELEMETRY_REST_URL` and `TELEMETRY_REST_KEY`; `None` unless both are set.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("TELEMETRY_REST_URL").ok()?;
        let api_key = env::var("TELEMETRY_REST_KEY").ok()?;
        if base_url.trim().is_empty() || api_key.trim().is_empty() {
            return None;
        }
        let timeout = env::var("TELEMETRY_REST_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map_or(Duration::from_secs(10), Duration::from_secs);
        Some(Self {
            base_url,
            api_key,
            timeout,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/rest/v1/{path}", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Clone)]
pub struct RestStore {
    client: Client,
    config: RestConfig,
}

impl RestStore {
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the api key is not a valid header value
    /// or the HTTP client cannot be built.
    pub fn new(config: RestConfig) -> Result<Self, StorageError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.api_key)
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(Self { client, config })
    }

    async fn send(
        &self,
        collection: Collection,
        request: RequestBuilder,
    ) -> Result<reqwest::Response, StorageError> {
        let response = request
            .send()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!(%collection, %status, body = %body, "rest request rejected");
        Err(classify_failure(collection, status, &body))
    }

    async fn insert<T: Serialize + Sync + ?Sized>(
        &self,
        collection: Collection,
        row: &T,
    ) -> Result<(), StorageError> {
        let request = self
            .client
            .post(self.config.endpoint(collection.as_str()))
            .header("Prefer", "return=minimal")
            .json(row);
        self.send(collection, request).await.map(drop)
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: Option<String>,
}

/// Map a non-success response onto a `StorageError`.
pub(crate) fn classify_failure(collection: Collection, status: StatusCode, body: &str) -> StorageError {
    let code = serde_json::from_str::<ApiError>(body)
        .ok()
        .and_then(|e| e.code);
    if code
        .as_deref()
        .is_some_and(|c| MISSING_RELATION_CODES.contains(&c))
        || status == StatusCode::NOT_FOUND
    {
        return StorageError::SchemaMissing { collection };
    }
    match status {
        StatusCode::CONFLICT => StorageError::Conflict,
        _ => StorageError::Connection(format!("{collection}: {status}: {body}")),
    }
}

#[derive(Debug, Serialize)]
struct ProgressPatch<'a> {
    progress: &'a UserStatistics,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct EnrollmentRow {
    id: u64,
    user_id: UserId,
    progress: f64,
    hours_spent: Option<f64>,
    score: Option<f64>,
}

impl From<EnrollmentRow> for EnrollmentRecord {
    fn from(row: EnrollmentRow) -> Self {
        Self {
            id: EnrollmentId::new(row.id),
            user_id: row.user_id,
            progress_percent: row.progress,
            hours_spent: row.hours_spent,
            score: row.score,
        }
    }
}

#[async_trait]
impl SessionRepository for RestStore {
    async fn upsert_session(&self, snapshot: &SessionSnapshot) -> Result<(), StorageError> {
        let collection = Collection::UserSessions;
        let request = self
            .client
            .post(self.config.endpoint(collection.as_str()))
            .query(&[("on_conflict", "session_id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(snapshot);
        self.send(collection, request).await.map(drop)
    }
}

#[async_trait]
impl PageViewRepository for RestStore {
    async fn append_page_view(&self, view: &PageView) -> Result<(), StorageError> {
        self.insert(Collection::PageViews, view).await
    }
}

#[async_trait]
impl EventRepository for RestStore {
    async fn append_event(&self, event: &Event) -> Result<(), StorageError> {
        self.insert(Collection::UserEvents, event).await
    }
}

#[async_trait]
impl ProfileRepository for RestStore {
    async fn update_progress(
        &self,
        user_id: &UserId,
        progress: &UserStatistics,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let collection = Collection::Profiles;
        let request = self
            .client
            .patch(self.config.endpoint(collection.as_str()))
            .query(&[("id", format!("eq.{user_id}"))])
            .header("Prefer", "return=representation")
            .json(&ProgressPatch {
                progress,
                updated_at,
            });
        let response = self.send(collection, request).await?;
        let updated: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        if updated.is_empty() {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl EnrollmentRepository for RestStore {
    async fn list_enrollments(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<EnrollmentRecord>, StorageError> {
        let collection = Collection::Enrollments;
        let request = self
            .client
            .get(self.config.endpoint(collection.as_str()))
            .query(&[
                ("user_id", format!("eq.{user_id}")),
                ("select", "id,user_id,progress,hours_spent,score".to_owned()),
            ]);
        let rows: Vec<EnrollmentRow> = self
            .send(collection, request)
            .await?
            .json()
            .await
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        Ok(rows.into_iter().map(EnrollmentRecord::from).collect())
    }
}

#[async_trait]
impl SchemaProvisioner for RestStore {
    async fn provision(&self, collection: Collection) -> Result<(), StorageError> {
        info!(%collection, "requesting remote provisioning");
        let response = self
            .client
            .post(self.config.endpoint(&format!("rpc/provision_{collection}")))
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(StorageError::Connection(format!(
            "provisioning {collection} failed: {status}: {body}"
        )))
    }
}

impl Storage {
    /// Build a `Storage` backed by the hosted REST store.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the HTTP client cannot be built.
    pub fn rest(config: RestConfig) -> Result<Self, StorageError> {
        Ok(Self::from_backend(RestStore::new(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base: &str) -> RestConfig {
        RestConfig {
            base_url: base.into(),
            api_key: "anon".into(),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        assert_eq!(
            config("https://db.example/").endpoint("page_views"),
            "https://db.example/rest/v1/page_views"
        );
        assert_eq!(
            config("https://db.example").endpoint("rpc/provision_user_events"),
            "https://db.example/rest/v1/rpc/provision_user_events"
        );
    }

    #[test]
    fn missing_relation_codes_mean_schema_missing() {
        let body = r#"{"code":"42P01","message":"relation \"public.page_views\" does not exist"}"#;
        let err = classify_failure(Collection::PageViews, StatusCode::BAD_REQUEST, body);
        assert!(matches!(
            err,
            StorageError::SchemaMissing {
                collection: Collection::PageViews
            }
        ));

        let body = r#"{"code":"PGRST205","message":"Could not find the table"}"#;
        let err = classify_failure(Collection::UserEvents, StatusCode::NOT_FOUND, body);
        assert!(err.is_schema_missing());
    }

    #[test]
    fn other_failures_are_not_schema_missing() {
        let err = classify_failure(
            Collection::PageViews,
            StatusCode::INTERNAL_SERVER_ERROR,
            "upstream timeout",
        );
        assert!(matches!(err, StorageError::Connection(_)));

        let err = classify_failure(Collection::UserSessions, StatusCode::CONFLICT, "{}");
        assert!(matches!(err, StorageError::Conflict));
    }

    #[test]
    fn store_rejects_unprintable_api_key() {
        let mut cfg = config("https://db.example");
        cfg.api_key = "bad\nkey".into();
        assert!(RestStore::new(cfg).is_err());
    }

    #[test]
    fn enrollment_rows_map_column_names() {
        let rows: Vec<EnrollmentRow> = serde_json::from_str(
            r#"[{"id":7,"user_id":"u-1","progress":100,"hours_spent":null,"score":88.5}]"#,
        )
        .unwrap();
        let record = EnrollmentRecord::from(rows.into_iter().next().unwrap());
        assert_eq!(record.id, EnrollmentId::new(7));
        assert!(record.is_completed());
        assert_eq!(record.hours_spent, None);
        assert_eq!(record.score, Some(88.5));
    }
}
