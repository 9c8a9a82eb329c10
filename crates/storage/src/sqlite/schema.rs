use sqlx::SqlitePool;

use crate::repository::Collection;

/// Create the table (and indexes) backing one collection, if missing.
pub(crate) async fn create_collection(
    pool: &SqlitePool,
    collection: Collection,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for statement in statements(collection) {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await
}

fn statements(collection: Collection) -> &'static [&'static str] {
    match collection {
        Collection::UserSessions => &[r"
            CREATE TABLE IF NOT EXISTS user_sessions (
                session_id TEXT PRIMARY KEY,
                user_id TEXT,
                started_at TEXT NOT NULL,
                captured_at TEXT NOT NULL,
                duration_ms INTEGER NOT NULL CHECK (duration_ms >= 0),
                page_view_count INTEGER NOT NULL CHECK (page_view_count >= 0),
                paths_visited TEXT NOT NULL,
                environment TEXT NOT NULL,
                referrer TEXT
            );
        "],
        Collection::PageViews => &[
            r"
            CREATE TABLE IF NOT EXISTS page_views (
                id INTEGER PRIMARY KEY,
                session_id TEXT NOT NULL,
                user_id TEXT,
                path TEXT NOT NULL,
                title TEXT NOT NULL,
                observed_at TEXT NOT NULL
            );
            ",
            r"
            CREATE INDEX IF NOT EXISTS idx_page_views_session_observed
                ON page_views (session_id, observed_at);
            ",
        ],
        Collection::UserEvents => &[
            r"
            CREATE TABLE IF NOT EXISTS user_events (
                id INTEGER PRIMARY KEY,
                session_id TEXT NOT NULL,
                user_id TEXT,
                name TEXT NOT NULL,
                attributes TEXT NOT NULL,
                path TEXT NOT NULL,
                observed_at TEXT NOT NULL
            );
            ",
            r"
            CREATE INDEX IF NOT EXISTS idx_user_events_name_observed
                ON user_events (name, observed_at);
            ",
        ],
        Collection::Profiles => &[r"
            CREATE TABLE IF NOT EXISTS profiles (
                id TEXT PRIMARY KEY,
                progress TEXT,
                updated_at TEXT
            );
        "],
        Collection::Enrollments => &[
            r"
            CREATE TABLE IF NOT EXISTS enrollments (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                progress REAL NOT NULL CHECK (progress >= 0),
                hours_spent REAL,
                score REAL
            );
            ",
            r"
            CREATE INDEX IF NOT EXISTS idx_enrollments_user
                ON enrollments (user_id);
            ",
        ],
    }
}
