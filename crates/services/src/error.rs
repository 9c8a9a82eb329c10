//! Shared error types for the services crate.

use thiserror::Error;

use storage::repository::{Collection, StorageError};
use storage::sqlite::SqliteInitError;
use telemetry_core::statistics::UserStatistics;

/// Outcome of one best-effort telemetry write.
///
/// These never reach tracking callers directly; they are logged where they
/// happen and only observable by settling a `BestEffort` handle.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteError {
    #[error("write to {collection} failed: {source}")]
    Remote {
        collection: Collection,
        #[source]
        source: StorageError,
    },
    #[error("local backup under {key:?} failed: {source}")]
    LocalBackup {
        key: String,
        #[source]
        source: StorageError,
    },
    #[error("session snapshot could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("no async runtime available to dispatch the write")]
    NoRuntime,
    #[error("write task aborted: {0}")]
    Aborted(String),
}

/// Errors emitted by `StatisticsService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StatisticsError {
    #[error("enrollments could not be fetched: {0}")]
    Fetch(#[source] StorageError),
    #[error("progress could not be written: {0}")]
    Progress(#[source] StorageError),
    /// Statistics were computed but could not be stored on the profile.
    #[error("statistics computed but not stored: {source}")]
    ProfileWrite {
        statistics: Box<UserStatistics>,
        #[source]
        source: StorageError,
    },
}

impl StatisticsError {
    /// Statistics computed before the failure, if any.
    #[must_use]
    pub fn statistics(&self) -> Option<&UserStatistics> {
        match self {
            StatisticsError::ProfileWrite { statistics, .. } => Some(statistics),
            _ => None,
        }
    }
}

/// Errors emitted while bootstrapping telemetry services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TelemetryServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
