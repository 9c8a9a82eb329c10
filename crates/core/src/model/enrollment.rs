use serde::{Deserialize, Serialize};

use crate::model::{EnrollmentId, UserId};

/// A user's relationship to one course, as stored by the enrollment system.
///
/// Read-only input to statistics; hours and score may be absent for courses the
/// learner has not engaged with yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub id: EnrollmentId,
    pub user_id: UserId,
    pub progress_percent: f64,
    pub hours_spent: Option<f64>,
    pub score: Option<f64>,
}

impl EnrollmentRecord {
    /// A course counts as completed once progress reaches 100%.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.progress_percent >= 100.0
    }
}
