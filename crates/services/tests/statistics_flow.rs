use std::sync::Arc;

use services::{EmptyEnrollmentPolicy, StatisticsConfig, StatisticsError, StatisticsService};
use storage::repository::{Collection, InMemoryRepository, StorageError};
use telemetry_core::model::{EnrollmentId, EnrollmentRecord, UserId};
use telemetry_core::statistics::StatisticsSource;
use telemetry_core::time::{fixed_clock, fixed_now};

fn service(repo: &InMemoryRepository, empty_policy: EmptyEnrollmentPolicy) -> StatisticsService {
    StatisticsService::new(
        fixed_clock(),
        StatisticsConfig { empty_policy },
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
    )
}

fn enrollment(user: &UserId, id: u64, progress: f64, hours: f64, score: f64) -> EnrollmentRecord {
    EnrollmentRecord {
        id: EnrollmentId::new(id),
        user_id: user.clone(),
        progress_percent: progress,
        hours_spent: Some(hours),
        score: Some(score),
    }
}

#[tokio::test]
async fn statistics_are_derived_and_stored() {
    let repo = InMemoryRepository::new();
    let user = UserId::new("learner-1").unwrap();
    repo.insert_profile(user.clone());
    repo.insert_enrollment(enrollment(&user, 1, 100.0, 10.0, 90.0));
    repo.insert_enrollment(enrollment(&user, 2, 40.0, 5.0, 70.0));

    let stats = service(&repo, EmptyEnrollmentPolicy::SampleCourses)
        .calculate_user_statistics(&user)
        .await
        .unwrap();

    assert_eq!(stats.courses_enrolled, 2);
    assert_eq!(stats.courses_completed, 1);
    assert_eq!(stats.certificates_earned, 1);
    assert_eq!(stats.progress_rate, 50);
    assert!((stats.average_score - 80.0).abs() < f64::EPSILON);
    assert!((stats.hours_learned - 15.0).abs() < f64::EPSILON);
    assert_eq!(stats.source, StatisticsSource::Enrollments);
    assert_eq!(stats.last_updated, fixed_now());
    assert_eq!(repo.progress(&user), Some(stats));
    assert_eq!(repo.progress_updated_at(&user), Some(fixed_now()));
}

#[tokio::test]
async fn other_users_rows_are_ignored() {
    let repo = InMemoryRepository::new();
    let user = UserId::new("learner-1").unwrap();
    let other = UserId::new("learner-2").unwrap();
    repo.insert_profile(user.clone());
    repo.insert_enrollment(enrollment(&user, 1, 10.0, 1.0, 50.0));
    repo.insert_enrollment(enrollment(&other, 2, 100.0, 9.0, 100.0));

    let stats = service(&repo, EmptyEnrollmentPolicy::SampleCourses)
        .calculate_user_statistics(&user)
        .await
        .unwrap();

    assert_eq!(stats.courses_enrolled, 1);
    assert_eq!(stats.courses_completed, 0);
    assert_eq!(stats.progress_rate, 0);
}

#[tokio::test]
async fn no_enrollments_yields_labelled_sample_data() {
    let repo = InMemoryRepository::new();
    let user = UserId::new("newcomer").unwrap();
    repo.insert_profile(user.clone());

    let stats = service(&repo, EmptyEnrollmentPolicy::SampleCourses)
        .calculate_user_statistics(&user)
        .await
        .unwrap();

    assert_eq!(stats.courses_enrolled, 2);
    assert_eq!(stats.courses_completed, 1);
    assert_eq!(stats.progress_rate, 50);
    assert_eq!(stats.source, StatisticsSource::SampleData);
    assert_eq!(stats.streak_days, 0);
}

#[tokio::test]
async fn empty_policy_reports_zeroes() {
    let repo = InMemoryRepository::new();
    let user = UserId::new("newcomer").unwrap();
    repo.insert_profile(user.clone());

    let stats = service(&repo, EmptyEnrollmentPolicy::Empty)
        .calculate_user_statistics(&user)
        .await
        .unwrap();

    assert_eq!(stats.courses_enrolled, 0);
    assert_eq!(stats.progress_rate, 0);
    assert!(stats.average_score.abs() < f64::EPSILON);
    assert_eq!(stats.source, StatisticsSource::Enrollments);
}

#[tokio::test]
async fn missing_enrollments_collection_reads_as_empty() {
    let repo = InMemoryRepository::with_unprovisioned(&[Collection::Enrollments]);
    let user = UserId::new("newcomer").unwrap();
    repo.insert_profile(user.clone());

    let stats = service(&repo, EmptyEnrollmentPolicy::SampleCourses)
        .calculate_user_statistics(&user)
        .await
        .unwrap();

    assert_eq!(stats.source, StatisticsSource::SampleData);
    assert_eq!(repo.provision_calls(Collection::Enrollments), 0);
}

#[tokio::test]
async fn failed_profile_write_still_returns_statistics() {
    let repo = InMemoryRepository::new();
    let user = UserId::new("no-profile").unwrap();
    repo.insert_enrollment(enrollment(&user, 1, 100.0, 2.0, 60.0));

    let err = service(&repo, EmptyEnrollmentPolicy::SampleCourses)
        .calculate_user_statistics(&user)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StatisticsError::ProfileWrite {
            source: StorageError::NotFound,
            ..
        }
    ));
    let stats = err.statistics().expect("statistics carried");
    assert_eq!(stats.courses_completed, 1);
    assert_eq!(stats.progress_rate, 100);
    assert_eq!(repo.progress(&user), None);
}

#[tokio::test]
async fn enrollment_read_failure_is_reported() {
    let repo = InMemoryRepository::new();
    repo.fail_collection(Collection::Enrollments);
    let user = UserId::new("learner-1").unwrap();
    repo.insert_profile(user.clone());

    let err = service(&repo, EmptyEnrollmentPolicy::SampleCourses)
        .calculate_user_statistics(&user)
        .await
        .unwrap_err();

    assert!(matches!(err, StatisticsError::Fetch(StorageError::Connection(_))));
    assert!(err.statistics().is_none());
    assert_eq!(repo.progress(&user), None);
}
