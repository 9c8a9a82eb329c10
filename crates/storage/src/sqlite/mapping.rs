use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::Row;
use telemetry_core::model::{EnrollmentId, EnrollmentRecord, UserId};

use crate::repository::{Collection, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Map a driver error, recognising a missing table as an unprovisioned collection.
pub(crate) fn classify(collection: Collection, err: sqlx::Error) -> StorageError {
    match &err {
        sqlx::Error::Database(db) if db.message().contains("no such table") => {
            StorageError::SchemaMissing { collection }
        }
        _ => StorageError::Connection(err.to_string()),
    }
}

pub(crate) fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(ser)
}

pub(crate) fn from_json<T: DeserializeOwned>(raw: &str) -> Result<T, StorageError> {
    serde_json::from_str(raw).map_err(ser)
}

pub(crate) fn u64_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn map_enrollment_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<EnrollmentRecord, StorageError> {
    let id = i64_to_u64("id", row.try_get::<i64, _>("id").map_err(ser)?)?;
    let user_id: String = row.try_get("user_id").map_err(ser)?;

    Ok(EnrollmentRecord {
        id: EnrollmentId::new(id),
        user_id: UserId::new(user_id).map_err(ser)?,
        progress_percent: row.try_get("progress").map_err(ser)?,
        hours_spent: row.try_get("hours_spent").map_err(ser)?,
        score: row.try_get("score").map_err(ser)?,
    })
}
