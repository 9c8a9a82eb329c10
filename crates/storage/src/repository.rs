use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use telemetry_core::model::{EnrollmentRecord, Event, PageView, SessionId, SessionSnapshot, UserId};
use telemetry_core::statistics::UserStatistics;
use thiserror::Error;

//
// ─── COLLECTIONS ───────────────────────────────────────────────────────────────
//

/// Remote collections this crate reads from or writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    UserSessions,
    PageViews,
    UserEvents,
    Profiles,
    Enrollments,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::UserSessions,
        Collection::PageViews,
        Collection::UserEvents,
        Collection::Profiles,
        Collection::Enrollments,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::UserSessions => "user_sessions",
            Collection::PageViews => "page_views",
            Collection::UserEvents => "user_events",
            Collection::Profiles => "profiles",
            Collection::Enrollments => "enrollments",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("collection {collection} has not been provisioned")]
    SchemaMissing { collection: Collection },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("local file error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    #[must_use]
    pub fn is_schema_missing(&self) -> bool {
        matches!(self, StorageError::SchemaMissing { .. })
    }
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

/// One row per session, keyed by session id.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert the snapshot, or replace the row already stored for its session id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::SchemaMissing` if `user_sessions` does not exist yet.
    async fn upsert_session(&self, snapshot: &SessionSnapshot) -> Result<(), StorageError>;
}

#[async_trait]
pub trait PageViewRepository: Send + Sync {
    /// Append one page view row.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::SchemaMissing` if `page_views` does not exist yet.
    async fn append_page_view(&self, view: &PageView) -> Result<(), StorageError>;
}

#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Append one event row with its attribute payload.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::SchemaMissing` if `user_events` does not exist yet.
    async fn append_event(&self, event: &Event) -> Result<(), StorageError>;
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Replace the `progress` field of a profile and stamp `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the user has no profile row.
    async fn update_progress(
        &self,
        user_id: &UserId,
        progress: &UserStatistics,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;
}

#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// Fetch every enrollment belonging to `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::SchemaMissing` if `enrollments` does not exist yet.
    async fn list_enrollments(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<EnrollmentRecord>, StorageError>;
}

/// Creates a missing collection on demand.
#[async_trait]
pub trait SchemaProvisioner: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the backend refuses or fails to create the collection.
    async fn provision(&self, collection: Collection) -> Result<(), StorageError>;
}

/// Durable device-local key-value storage.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Overwrite the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be written.
    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Default)]
struct ProfileRow {
    progress: Option<UserStatistics>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct MemoryState {
    sessions: HashMap<SessionId, SessionSnapshot>,
    page_views: Vec<PageView>,
    events: Vec<Event>,
    profiles: HashMap<UserId, ProfileRow>,
    enrollments: Vec<EnrollmentRecord>,
    local: HashMap<String, String>,
    unprovisioned: HashSet<Collection>,
    provisioning_inert: bool,
    failing: HashSet<Collection>,
    provision_calls: HashMap<Collection, usize>,
}

impl MemoryState {
    fn check(&self, collection: Collection) -> Result<(), StorageError> {
        if self.unprovisioned.contains(&collection) {
            return Err(StorageError::SchemaMissing { collection });
        }
        if self.failing.contains(&collection) {
            return Err(StorageError::Connection(format!(
                "simulated outage on {collection}"
            )));
        }
        Ok(())
    }
}

/// In-memory store for tests and prototyping.
///
/// Besides holding rows it can simulate the failure modes of a hosted backend:
/// collections that have not been provisioned, provisioning that silently has no
/// effect, and collections whose writes fail.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with the given collections missing until provisioned.
    #[must_use]
    pub fn with_unprovisioned(collections: &[Collection]) -> Self {
        let repo = Self::new();
        repo.guard().unprovisioned.extend(collections.iter().copied());
        repo
    }

    /// When inert, `provision` is counted but leaves collections missing.
    pub fn set_provisioning_inert(&self, inert: bool) {
        self.guard().provisioning_inert = inert;
    }

    /// Make every read and write against `collection` fail with a connection error.
    pub fn fail_collection(&self, collection: Collection) {
        self.guard().failing.insert(collection);
    }

    pub fn insert_profile(&self, user_id: UserId) {
        self.guard().profiles.entry(user_id).or_default();
    }

    pub fn insert_enrollment(&self, record: EnrollmentRecord) {
        self.guard().enrollments.push(record);
    }

    #[must_use]
    pub fn session(&self, id: SessionId) -> Option<SessionSnapshot> {
        self.guard().sessions.get(&id).cloned()
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.guard().sessions.len()
    }

    #[must_use]
    pub fn page_views(&self) -> Vec<PageView> {
        self.guard().page_views.clone()
    }

    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.guard().events.clone()
    }

    #[must_use]
    pub fn progress(&self, user_id: &UserId) -> Option<UserStatistics> {
        self.guard()
            .profiles
            .get(user_id)
            .and_then(|row| row.progress.clone())
    }

    #[must_use]
    pub fn progress_updated_at(&self, user_id: &UserId) -> Option<DateTime<Utc>> {
        self.guard()
            .profiles
            .get(user_id)
            .and_then(|row| row.updated_at)
    }

    #[must_use]
    pub fn local_value(&self, key: &str) -> Option<String> {
        self.guard().local.get(key).cloned()
    }

    #[must_use]
    pub fn provision_calls(&self, collection: Collection) -> usize {
        self.guard()
            .provision_calls
            .get(&collection)
            .copied()
            .unwrap_or(0)
    }

    fn guard(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn upsert_session(&self, snapshot: &SessionSnapshot) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.check(Collection::UserSessions)?;
        guard.sessions.insert(snapshot.session_id, snapshot.clone());
        Ok(())
    }
}

#[async_trait]
impl PageViewRepository for InMemoryRepository {
    async fn append_page_view(&self, view: &PageView) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.check(Collection::PageViews)?;
        guard.page_views.push(view.clone());
        Ok(())
    }
}

#[async_trait]
impl EventRepository for InMemoryRepository {
    async fn append_event(&self, event: &Event) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.check(Collection::UserEvents)?;
        guard.events.push(event.clone());
        Ok(())
    }
}

#[async_trait]
impl ProfileRepository for InMemoryRepository {
    async fn update_progress(
        &self,
        user_id: &UserId,
        progress: &UserStatistics,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.check(Collection::Profiles)?;
        let row = guard
            .profiles
            .get_mut(user_id)
            .ok_or(StorageError::NotFound)?;
        row.progress = Some(progress.clone());
        row.updated_at = Some(updated_at);
        Ok(())
    }
}

#[async_trait]
impl EnrollmentRepository for InMemoryRepository {
    async fn list_enrollments(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<EnrollmentRecord>, StorageError> {
        let guard = self.lock()?;
        guard.check(Collection::Enrollments)?;
        Ok(guard
            .enrollments
            .iter()
            .filter(|record| &record.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SchemaProvisioner for InMemoryRepository {
    async fn provision(&self, collection: Collection) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        *guard.provision_calls.entry(collection).or_insert(0) += 1;
        if !guard.provisioning_inert {
            guard.unprovisioned.remove(&collection);
        }
        Ok(())
    }
}

#[async_trait]
impl LocalStore for InMemoryRepository {
    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.local.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

//
// ─── STORAGE BUNDLE ────────────────────────────────────────────────────────────
//

/// Remote collections behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub sessions: Arc<dyn SessionRepository>,
    pub page_views: Arc<dyn PageViewRepository>,
    pub events: Arc<dyn EventRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub enrollments: Arc<dyn EnrollmentRepository>,
    pub provisioner: Arc<dyn SchemaProvisioner>,
}

impl Storage {
    /// Route every collection to one backend.
    #[must_use]
    pub fn from_backend<B>(backend: B) -> Self
    where
        B: SessionRepository
            + PageViewRepository
            + EventRepository
            + ProfileRepository
            + EnrollmentRepository
            + SchemaProvisioner
            + Clone
            + 'static,
    {
        Self {
            sessions: Arc::new(backend.clone()),
            page_views: Arc::new(backend.clone()),
            events: Arc::new(backend.clone()),
            profiles: Arc::new(backend.clone()),
            enrollments: Arc::new(backend.clone()),
            provisioner: Arc::new(backend),
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_backend(InMemoryRepository::new())
    }
}
