//! Derivation of learner statistics from raw enrollment rows.
//!
//! Everything here is pure: the statistics are fully recomputed from the input
//! rows on every call and never patched in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{EnrollmentId, EnrollmentRecord, UserId};

//
// ─── SOURCE ───────────────────────────────────────────────────────────────────
//

/// Where the numbers in a `UserStatistics` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticsSource {
    /// Derived from the user's own enrollment rows.
    Enrollments,
    /// Derived from the fixed sample rows substituted for a user with no enrollments.
    SampleData,
}

//
// ─── STATISTICS ───────────────────────────────────────────────────────────────
//

/// Derived summary of a user's learning progress, stored on the profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatistics {
    pub courses_enrolled: u32,
    pub courses_completed: u32,
    pub certificates_earned: u32,
    pub hours_learned: f64,
    pub average_score: f64,
    pub progress_rate: u32,
    pub streak_days: u32,
    pub last_updated: DateTime<Utc>,
    pub source: StatisticsSource,
}

impl UserStatistics {
    /// Compute statistics from enrollment rows.
    ///
    /// Missing hours count as zero. Missing scores are left out of the mean, and the
    /// mean is zero when no row has a score. `streak_days` stays zero because no
    /// activity signal is part of the input.
    #[must_use]
    pub fn from_enrollments(
        records: &[EnrollmentRecord],
        source: StatisticsSource,
        computed_at: DateTime<Utc>,
    ) -> Self {
        let courses_enrolled = count(records.len());
        let courses_completed = count(records.iter().filter(|r| r.is_completed()).count());

        let hours: f64 = records.iter().filter_map(|r| r.hours_spent).sum();

        let scores: Vec<f64> = records.iter().filter_map(|r| r.score).collect();
        let average_score = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / f64::from(count(scores.len()))
        };

        Self {
            courses_enrolled,
            courses_completed,
            certificates_earned: courses_completed,
            hours_learned: round_tenth(hours),
            average_score: round_tenth(average_score),
            progress_rate: progress_rate(courses_completed, courses_enrolled),
            streak_days: 0,
            last_updated: computed_at,
            source,
        }
    }
}

/// Fixed stand-in rows used when a user has no enrollments yet.
#[must_use]
pub fn sample_enrollments(user_id: &UserId) -> Vec<EnrollmentRecord> {
    vec![
        EnrollmentRecord {
            id: EnrollmentId::new(1),
            user_id: user_id.clone(),
            progress_percent: 100.0,
            hours_spent: Some(12.0),
            score: Some(92.0),
        },
        EnrollmentRecord {
            id: EnrollmentId::new(2),
            user_id: user_id.clone(),
            progress_percent: 45.0,
            hours_spent: Some(6.5),
            score: Some(78.0),
        },
    ]
}

/// `round(100 * completed / enrolled)`, rounding halves up; zero when nothing is enrolled.
#[must_use]
pub fn progress_rate(completed: u32, enrolled: u32) -> u32 {
    if enrolled == 0 {
        return 0;
    }
    let completed = u64::from(completed);
    let enrolled = u64::from(enrolled);
    let rate = (200 * completed + enrolled) / (2 * enrolled);
    u32::try_from(rate).unwrap_or(u32::MAX)
}

fn count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
