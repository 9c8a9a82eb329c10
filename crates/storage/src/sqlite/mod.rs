use std::time::Duration;

use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use thiserror::Error;
use tracing::info;

use crate::repository::{Collection, SchemaProvisioner, Storage, StorageError};

mod activity_repo;
mod mapping;
mod profile_repo;
mod schema;

#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SqliteRepository {
    /// Connect to `SQLite` using the given URL.
    ///
    /// No tables are created here; collections are provisioned on demand or by `migrate`.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the connection cannot be established.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA journal_mode = WAL;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA busy_timeout = 5000;")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Provision every collection.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if any table cannot be created.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        for collection in Collection::ALL {
            self.provision(collection).await?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SchemaProvisioner for SqliteRepository {
    async fn provision(&self, collection: Collection) -> Result<(), StorageError> {
        info!(%collection, "provisioning sqlite table");
        schema::create_collection(&self.pool, collection)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

impl Storage {
    /// Build a `Storage` backed by `SQLite`.
    ///
    /// Tables are left to be provisioned by the first write that needs them.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the connection cannot be established.
    pub async fn sqlite(database_url: &str) -> Result<Self, SqliteInitError> {
        let repo = SqliteRepository::connect(database_url).await?;
        Ok(Self::from_backend(repo))
    }
}
