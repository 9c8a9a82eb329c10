use telemetry_core::model::{Event, PageView, SessionSnapshot};

use super::SqliteRepository;
use super::mapping::{classify, to_json, u64_to_i64};
use crate::repository::{
    Collection, EventRepository, PageViewRepository, SessionRepository, StorageError,
};

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn upsert_session(&self, snapshot: &SessionSnapshot) -> Result<(), StorageError> {
        let duration_ms = u64_to_i64("duration_ms", snapshot.duration_ms)?;
        let paths = to_json(&snapshot.paths_visited)?;
        let environment = to_json(&snapshot.environment)?;

        sqlx::query(
            r"
            INSERT INTO user_sessions (
                session_id, user_id, started_at, captured_at, duration_ms,
                page_view_count, paths_visited, environment, referrer
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(session_id) DO UPDATE SET
                user_id = excluded.user_id,
                captured_at = excluded.captured_at,
                duration_ms = excluded.duration_ms,
                page_view_count = excluded.page_view_count,
                paths_visited = excluded.paths_visited,
                environment = excluded.environment,
                referrer = excluded.referrer
            ",
        )
        .bind(snapshot.session_id.to_string())
        .bind(snapshot.user_id.as_ref().map(ToString::to_string))
        .bind(snapshot.started_at)
        .bind(snapshot.captured_at)
        .bind(duration_ms)
        .bind(i64::from(snapshot.page_view_count))
        .bind(paths)
        .bind(environment)
        .bind(snapshot.referrer.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| classify(Collection::UserSessions, e))?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl PageViewRepository for SqliteRepository {
    async fn append_page_view(&self, view: &PageView) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO page_views (session_id, user_id, path, title, observed_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )
        .bind(view.session_id.to_string())
        .bind(view.user_id.as_ref().map(ToString::to_string))
        .bind(view.path.as_str())
        .bind(view.title.as_str())
        .bind(view.observed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| classify(Collection::PageViews, e))?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl EventRepository for SqliteRepository {
    async fn append_event(&self, event: &Event) -> Result<(), StorageError> {
        let attributes = to_json(&event.attributes)?;

        sqlx::query(
            r"
            INSERT INTO user_events (session_id, user_id, name, attributes, path, observed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )
        .bind(event.session_id.to_string())
        .bind(event.user_id.as_ref().map(ToString::to_string))
        .bind(event.name.as_str())
        .bind(attributes)
        .bind(event.path.as_str())
        .bind(event.observed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| classify(Collection::UserEvents, e))?;

        Ok(())
    }
}
