use chrono::{DateTime, Utc};
use telemetry_core::model::{EnrollmentRecord, UserId};
use telemetry_core::statistics::UserStatistics;

use super::SqliteRepository;
use super::mapping::{classify, from_json, map_enrollment_row, to_json, u64_to_i64};
use crate::repository::{Collection, EnrollmentRepository, ProfileRepository, StorageError};

impl SqliteRepository {
    /// Create an empty profile row for `user_id` if none exists.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the insert fails.
    pub async fn insert_profile(&self, user_id: &UserId) -> Result<(), StorageError> {
        sqlx::query("INSERT INTO profiles (id) VALUES (?1) ON CONFLICT(id) DO NOTHING")
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| classify(Collection::Profiles, e))?;
        Ok(())
    }

    /// Insert or replace one enrollment row.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the insert fails.
    pub async fn upsert_enrollment(&self, record: &EnrollmentRecord) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO enrollments (id, user_id, progress, hours_spent, score)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                user_id = excluded.user_id,
                progress = excluded.progress,
                hours_spent = excluded.hours_spent,
                score = excluded.score
            ",
        )
        .bind(u64_to_i64("id", record.id.value())?)
        .bind(record.user_id.as_str())
        .bind(record.progress_percent)
        .bind(record.hours_spent)
        .bind(record.score)
        .execute(&self.pool)
        .await
        .map_err(|e| classify(Collection::Enrollments, e))?;
        Ok(())
    }

    /// Read back the progress stored on a profile.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the profile does not exist.
    pub async fn load_progress(
        &self,
        user_id: &UserId,
    ) -> Result<Option<UserStatistics>, StorageError> {
        let raw: Option<String> = sqlx::query_scalar("SELECT progress FROM profiles WHERE id = ?1")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| classify(Collection::Profiles, e))?
            .ok_or(StorageError::NotFound)?;

        raw.as_deref().map(from_json::<UserStatistics>).transpose()
    }
}

#[async_trait::async_trait]
impl ProfileRepository for SqliteRepository {
    async fn update_progress(
        &self,
        user_id: &UserId,
        progress: &UserStatistics,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let payload = to_json(progress)?;

        let res = sqlx::query("UPDATE profiles SET progress = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(payload)
            .bind(updated_at)
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| classify(Collection::Profiles, e))?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl EnrollmentRepository for SqliteRepository {
    async fn list_enrollments(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<EnrollmentRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, user_id, progress, hours_spent, score
            FROM enrollments
            WHERE user_id = ?1
            ORDER BY id ASC
            ",
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| classify(Collection::Enrollments, e))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_enrollment_row(&row)?);
        }
        Ok(out)
    }
}
