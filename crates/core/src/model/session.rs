use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::model::{PagePath, SessionId, UserId};

//
// ─── PAGE VIEW ─────────────────────────────────────────────────────────────────
//

/// A single observed navigation to a path within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageView {
    pub session_id: SessionId,
    pub user_id: Option<UserId>,
    pub path: PagePath,
    pub title: String,
    pub observed_at: DateTime<Utc>,
}

//
// ─── SNAPSHOT ──────────────────────────────────────────────────────────────────
//

/// Environment metadata reported by the host at flush time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub user_agent: String,
    pub language: String,
    pub platform: String,
    pub screen: String,
    pub viewport: String,
    pub timezone: String,
}

/// Host-side facts folded into a snapshot alongside the session itself.
#[derive(Debug, Clone, Default)]
pub struct SnapshotContext {
    pub user_id: Option<UserId>,
    pub environment: EnvironmentInfo,
    pub referrer: Option<String>,
}

/// Point-in-time serialization of a `Session`.
///
/// Overwritten on every flush; never merged with an earlier snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub user_id: Option<UserId>,
    pub started_at: DateTime<Utc>,
    pub captured_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub page_view_count: u32,
    pub paths_visited: Vec<PagePath>,
    pub environment: EnvironmentInfo,
    pub referrer: Option<String>,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One page-load lifetime of user activity.
///
/// Page views are append-only and kept in the order they were recorded. The
/// duration never decreases, even if the clock passed to `refresh_duration` does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    started_at: DateTime<Utc>,
    page_views: Vec<PageView>,
    duration_ms: u64,
}

impl Session {
    #[must_use]
    pub fn new(id: SessionId, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            started_at,
            page_views: Vec::new(),
            duration_ms: 0,
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn page_views(&self) -> &[PageView] {
        &self.page_views
    }

    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Append a page view stamped with this session's id.
    pub fn record_page_view(
        &mut self,
        path: PagePath,
        title: impl Into<String>,
        user_id: Option<UserId>,
        observed_at: DateTime<Utc>,
    ) -> &PageView {
        let index = self.page_views.len();
        self.page_views.push(PageView {
            session_id: self.id,
            user_id,
            path,
            title: title.into(),
            observed_at,
        });
        &self.page_views[index]
    }

    /// Recompute elapsed time against `now`, keeping the larger of old and new values.
    pub fn refresh_duration(&mut self, now: DateTime<Utc>) -> u64 {
        let elapsed = (now - self.started_at).num_milliseconds();
        let elapsed = u64::try_from(elapsed).unwrap_or(0);
        self.duration_ms = self.duration_ms.max(elapsed);
        self.duration_ms
    }

    /// Distinct paths in first-seen order.
    #[must_use]
    pub fn distinct_paths(&self) -> Vec<PagePath> {
        let mut seen = HashSet::new();
        self.page_views
            .iter()
            .filter(|view| seen.insert(&view.path))
            .map(|view| view.path.clone())
            .collect()
    }

    /// Refresh the duration and capture a snapshot at `now`.
    pub fn snapshot(&mut self, context: SnapshotContext, now: DateTime<Utc>) -> SessionSnapshot {
        let duration_ms = self.refresh_duration(now);
        SessionSnapshot {
            session_id: self.id,
            user_id: context.user_id,
            started_at: self.started_at,
            captured_at: now,
            duration_ms,
            page_view_count: u32::try_from(self.page_views.len()).unwrap_or(u32::MAX),
            paths_visited: self.distinct_paths(),
            environment: context.environment,
            referrer: context.referrer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn session() -> Session {
        Session::new(SessionId::generate(), fixed_now())
    }

    #[test]
    fn page_views_keep_recording_order() {
        let mut s = session();
        let paths = ["/", "/courses", "/courses/rust", "/courses", "/dashboard"];
        for (i, p) in paths.iter().enumerate() {
            let at = fixed_now() + Duration::seconds(i64::try_from(i).unwrap());
            s.record_page_view(PagePath::from_location(p), "t", None, at);
        }

        let recorded: Vec<_> = s.page_views().iter().map(|v| v.path.as_str()).collect();
        assert_eq!(recorded, paths);
        assert!(s.page_views().iter().all(|v| v.session_id == s.id()));
    }

    #[test]
    fn duration_never_decreases() {
        let mut s = session();
        assert_eq!(s.refresh_duration(fixed_now() + Duration::seconds(5)), 5_000);
        assert_eq!(s.refresh_duration(fixed_now() + Duration::seconds(2)), 5_000);
        assert_eq!(s.refresh_duration(fixed_now() - Duration::seconds(60)), 5_000);
        assert_eq!(s.refresh_duration(fixed_now() + Duration::seconds(9)), 9_000);
    }

    #[test]
    fn snapshot_counts_views_and_dedups_paths() {
        let mut s = session();
        for p in ["/", "/a", "/", "/b", "/a"] {
            s.record_page_view(PagePath::from_location(p), "t", None, fixed_now());
        }
        let context = SnapshotContext {
            referrer: Some("https://search.example".into()),
            ..SnapshotContext::default()
        };

        let snap = s.snapshot(context, fixed_now() + Duration::milliseconds(1_500));

        assert_eq!(snap.session_id, s.id());
        assert_eq!(snap.page_view_count, 5);
        assert_eq!(snap.duration_ms, 1_500);
        let paths: Vec<_> = snap.paths_visited.iter().map(PagePath::as_str).collect();
        assert_eq!(paths, ["/", "/a", "/b"]);
        assert_eq!(snap.referrer.as_deref(), Some("https://search.example"));
    }
}
