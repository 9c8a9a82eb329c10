use std::sync::Arc;

use storage::repository::{EnrollmentRepository, ProfileRepository};
use telemetry_core::model::UserId;
use telemetry_core::statistics::{sample_enrollments, StatisticsSource, UserStatistics};
use tracing::{debug, warn};

use crate::error::StatisticsError;
use crate::Clock;

/// What to report for a user with no enrollment rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmptyEnrollmentPolicy {
    /// Compute from fixed sample rows and label the result `SampleData`.
    #[default]
    SampleCourses,
    /// Report zeroes.
    Empty,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatisticsConfig {
    pub empty_policy: EmptyEnrollmentPolicy,
}

/// Derives learning statistics from enrollments and stores them on the profile.
#[derive(Clone)]
pub struct StatisticsService {
    clock: Clock,
    config: StatisticsConfig,
    enrollments: Arc<dyn EnrollmentRepository>,
    profiles: Arc<dyn ProfileRepository>,
}

impl StatisticsService {
    #[must_use]
    pub fn new(
        clock: Clock,
        config: StatisticsConfig,
        enrollments: Arc<dyn EnrollmentRepository>,
        profiles: Arc<dyn ProfileRepository>,
    ) -> Self {
        Self {
            clock,
            config,
            enrollments,
            profiles,
        }
    }

    /// Compute statistics for `user_id` and write them to the user's profile.
    ///
    /// A missing enrollments collection reads as "no enrollments".
    ///
    /// # Errors
    ///
    /// Returns `StatisticsError::Fetch` if enrollments cannot be read.
    /// Returns `StatisticsError::ProfileWrite`, carrying the computed statistics,
    /// if the profile update fails.
    pub async fn calculate_user_statistics(
        &self,
        user_id: &UserId,
    ) -> Result<UserStatistics, StatisticsError> {
        let records = match self.enrollments.list_enrollments(user_id).await {
            Ok(records) => records,
            Err(err) if err.is_schema_missing() => {
                debug!(user_id = %user_id, "enrollments collection missing; treating as empty");
                Vec::new()
            }
            Err(err) => return Err(StatisticsError::Fetch(err)),
        };

        let now = self.clock.now();
        let statistics = if records.is_empty() {
            match self.config.empty_policy {
                EmptyEnrollmentPolicy::SampleCourses => UserStatistics::from_enrollments(
                    &sample_enrollments(user_id),
                    StatisticsSource::SampleData,
                    now,
                ),
                EmptyEnrollmentPolicy::Empty => {
                    UserStatistics::from_enrollments(&[], StatisticsSource::Enrollments, now)
                }
            }
        } else {
            UserStatistics::from_enrollments(&records, StatisticsSource::Enrollments, now)
        };

        match self.update_user_progress(user_id, &statistics).await {
            Ok(()) => Ok(statistics),
            Err(StatisticsError::Progress(source)) => {
                warn!(user_id = %user_id, error = %source, "statistics not stored on profile");
                Err(StatisticsError::ProfileWrite {
                    statistics: Box::new(statistics),
                    source,
                })
            }
            Err(other) => Err(other),
        }
    }

    /// Store `statistics` as the profile's progress, stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns `StatisticsError::Progress` if the profile is missing or the write fails.
    pub async fn update_user_progress(
        &self,
        user_id: &UserId,
        statistics: &UserStatistics,
    ) -> Result<(), StatisticsError> {
        self.profiles
            .update_progress(user_id, statistics, self.clock.now())
            .await
            .map_err(StatisticsError::Progress)
    }
}
