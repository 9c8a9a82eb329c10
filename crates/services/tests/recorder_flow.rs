use std::sync::Arc;

use async_trait::async_trait;
use services::host::{
    HostEnvironment, LifecycleHandler, LifecycleSource, NavigationEvent, NavigationHandler,
    NavigationKind, NavigationSource, SimulatedHost, Subscription, Visibility,
};
use services::{Recorder, RecorderConfig, WriteError, DEFAULT_SNAPSHOT_KEY};
use storage::local::FileLocalStore;
use storage::repository::{Collection, InMemoryRepository, LocalStore, Storage, StorageError};
use telemetry_core::model::{EnvironmentInfo, EventName, RecorderPhase, SessionSnapshot};
use telemetry_core::time::fixed_clock;

fn recorder(host: &SimulatedHost, repo: &InMemoryRepository) -> Recorder {
    Recorder::new(
        RecorderConfig::default(),
        fixed_clock(),
        Arc::new(host.clone()),
        &Storage::from_backend(repo.clone()),
        Arc::new(repo.clone()),
    )
}

fn paths(recorder: &Recorder) -> Vec<String> {
    recorder
        .page_views()
        .iter()
        .map(|view| view.path.as_str().to_owned())
        .collect()
}

/// Writes dispatched from host handlers are detached; give them a chance to run.
async fn let_writes_land() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

struct BrokenLocalStore;

#[async_trait]
impl LocalStore for BrokenLocalStore {
    async fn put(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Connection("disk full".into()))
    }
}

/// Router that replays the current route to every new navigation handler.
struct ReplayingHost {
    inner: SimulatedHost,
}

impl NavigationSource for ReplayingHost {
    fn on_navigate(&self, handler: NavigationHandler) -> Subscription {
        handler(&NavigationEvent {
            kind: NavigationKind::Replace,
            location: self.inner.current_location(),
        });
        self.inner.on_navigate(handler)
    }
}

impl LifecycleSource for ReplayingHost {
    fn on_lifecycle(&self, handler: LifecycleHandler) -> Subscription {
        self.inner.on_lifecycle(handler)
    }
}

impl HostEnvironment for ReplayingHost {
    fn current_location(&self) -> String {
        self.inner.current_location()
    }

    fn document_title(&self) -> String {
        self.inner.document_title()
    }

    fn referrer(&self) -> Option<String> {
        self.inner.referrer()
    }

    fn environment(&self) -> EnvironmentInfo {
        self.inner.environment()
    }
}

#[tokio::test]
async fn navigations_are_recorded_in_order() {
    let host = SimulatedHost::new("https://learn.example.com/");
    let repo = InMemoryRepository::new();
    let recorder = recorder(&host, &repo);

    recorder.start().settle().await.unwrap();
    host.push("/courses");
    host.push("/courses/rust?tab=syllabus");
    host.push("https://learn.example.com/profile#badges");
    let_writes_land().await;

    assert_eq!(
        paths(&recorder),
        ["/", "/courses", "/courses/rust", "/profile"]
    );
    let stored = repo.page_views();
    assert_eq!(stored.len(), 4);
    assert!(stored
        .iter()
        .all(|view| view.session_id == recorder.session_id()));
}

#[tokio::test]
async fn starting_twice_installs_hooks_once() {
    let host = SimulatedHost::new("/");
    let repo = InMemoryRepository::new();
    let recorder = recorder(&host, &repo);

    recorder.start().settle().await.unwrap();
    let second = recorder.start();
    assert_eq!(second.dispatched(), 0);
    second.settle().await.unwrap();

    assert_eq!(recorder.page_views().len(), 1);
    assert_eq!(host.navigation_subscribers(), 1);
    assert_eq!(host.lifecycle_subscribers(), 1);
    assert_eq!(recorder.phase(), RecorderPhase::Tracking);
}

#[tokio::test]
async fn explicit_tracking_is_never_deduplicated() {
    let host = SimulatedHost::new("/");
    let repo = InMemoryRepository::new();
    let recorder = recorder(&host, &repo);

    recorder.track_page_view("/a").settle().await.unwrap();
    recorder.track_page_view("/a").settle().await.unwrap();

    assert_eq!(paths(&recorder), ["/a", "/a"]);
    assert_eq!(repo.page_views().len(), 2);
    assert_eq!(recorder.phase(), RecorderPhase::Idle);
}

#[tokio::test]
async fn hook_navigation_to_same_path_is_skipped() {
    let host = SimulatedHost::new("/a");
    let repo = InMemoryRepository::new();
    let recorder = recorder(&host, &repo);

    recorder.start().settle().await.unwrap();
    host.replace("/a");
    host.replace("/a?ref=menu");
    host.push("/b");
    assert!(host.back());
    assert!(host.forward());
    let_writes_land().await;

    assert_eq!(paths(&recorder), ["/a", "/b", "/a", "/b"]);
    assert_eq!(repo.page_views().len(), 4);
}

#[tokio::test]
async fn hiding_flushes_locally_and_remotely() {
    let host = SimulatedHost::new("/").with_referrer("https://search.example.com/");
    let repo = InMemoryRepository::new();
    let recorder = recorder(&host, &repo);

    recorder.start().settle().await.unwrap();
    host.push("/b");
    host.push("/");
    host.hide();
    let_writes_land().await;
    assert_eq!(recorder.phase(), RecorderPhase::Backgrounded);

    let backup = repo.local_value(DEFAULT_SNAPSHOT_KEY).expect("backup written");
    let snapshot: SessionSnapshot = serde_json::from_str(&backup).unwrap();
    assert_eq!(snapshot.session_id, recorder.session_id());
    assert_eq!(snapshot.page_view_count, 3);
    assert_eq!(snapshot.paths_visited.len(), 2);
    assert_eq!(
        snapshot.referrer.as_deref(),
        Some("https://search.example.com/")
    );
    assert_eq!(repo.session(recorder.session_id()), Some(snapshot));

    host.show();
    assert_eq!(recorder.phase(), RecorderPhase::Tracking);
}

#[tokio::test]
async fn missing_collections_are_provisioned_then_retried() {
    let host = SimulatedHost::new("/");
    let repo =
        InMemoryRepository::with_unprovisioned(&[Collection::PageViews, Collection::UserSessions]);
    let recorder = recorder(&host, &repo);

    recorder.start().settle().await.unwrap();

    assert_eq!(repo.provision_calls(Collection::PageViews), 1);
    assert_eq!(repo.provision_calls(Collection::UserSessions), 1);
    assert_eq!(repo.page_views().len(), 1);
    assert!(repo.session(recorder.session_id()).is_some());
}

#[tokio::test]
async fn ineffective_provisioning_fails_quietly_and_is_retried_next_time() {
    let host = SimulatedHost::new("/");
    let repo = InMemoryRepository::with_unprovisioned(&[Collection::PageViews]);
    repo.set_provisioning_inert(true);
    let recorder = recorder(&host, &repo);

    let err = recorder.track_page_view("/x").settle().await.unwrap_err();
    assert!(matches!(
        err,
        WriteError::Remote {
            collection: Collection::PageViews,
            source: StorageError::SchemaMissing { .. },
        }
    ));
    assert_eq!(repo.provision_calls(Collection::PageViews), 1);

    assert!(recorder.track_page_view("/y").settle().await.is_err());
    assert_eq!(repo.provision_calls(Collection::PageViews), 2);
    assert_eq!(recorder.page_views().len(), 2);
}

#[tokio::test]
async fn provisioning_can_be_switched_off() {
    let host = SimulatedHost::new("/");
    let repo = InMemoryRepository::with_unprovisioned(&[Collection::PageViews]);
    let recorder = Recorder::new(
        RecorderConfig {
            provision_on_missing_schema: false,
            ..RecorderConfig::default()
        },
        fixed_clock(),
        Arc::new(host),
        &Storage::from_backend(repo.clone()),
        Arc::new(repo.clone()),
    );

    assert!(recorder.track_page_view("/x").settle().await.is_err());
    assert_eq!(repo.provision_calls(Collection::PageViews), 0);
}

#[tokio::test]
async fn unload_flushes_and_stops_recording() {
    let host = SimulatedHost::new("/");
    let repo = InMemoryRepository::new();
    let recorder = recorder(&host, &repo);

    recorder.start().settle().await.unwrap();
    host.unload();
    let_writes_land().await;

    assert_eq!(recorder.phase(), RecorderPhase::Terminated);
    assert_eq!(host.navigation_subscribers(), 0);
    assert_eq!(host.lifecycle_subscribers(), 0);
    assert!(repo.session(recorder.session_id()).is_some());

    host.push("/later");
    assert_eq!(recorder.track_page_view("/later").dispatched(), 0);
    assert_eq!(
        recorder
            .track_event(EventName::Custom("late".into()), Default::default())
            .dispatched(),
        0
    );
    assert_eq!(recorder.unload().dispatched(), 0);
    assert_eq!(recorder.page_views().len(), 1);
}

#[tokio::test]
async fn events_carry_session_and_current_path() {
    let host = SimulatedHost::new("https://learn.example.com/courses/42?from=home");
    let repo = InMemoryRepository::new();
    let recorder = recorder(&host, &repo);
    recorder.start().settle().await.unwrap();

    recorder
        .track_course_enrollment("42", "Rust for Beginners")
        .settle()
        .await
        .unwrap();
    recorder
        .track_download("r-9", "cheatsheet.pdf", "pdf")
        .settle()
        .await
        .unwrap();

    let events = repo.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].name, EventName::CourseEnrollment);
    assert_eq!(events[0].session_id, recorder.session_id());
    assert_eq!(events[0].path.as_str(), "/courses/42");
    assert_eq!(events[1].name, EventName::ResourceDownload);
    assert_eq!(events[1].attributes.len(), 3);
}

#[tokio::test]
async fn failed_backup_does_not_block_remote_snapshot() {
    let host = SimulatedHost::new("/");
    let repo = InMemoryRepository::new();
    let recorder = Recorder::new(
        RecorderConfig::default(),
        fixed_clock(),
        Arc::new(host.clone()),
        &Storage::from_backend(repo.clone()),
        Arc::new(BrokenLocalStore),
    );

    let err = recorder.start().settle().await.unwrap_err();
    assert!(matches!(err, WriteError::LocalBackup { .. }));
    assert!(repo.session(recorder.session_id()).is_some());
    assert_eq!(host.current_location(), "/");
}

#[tokio::test]
async fn host_may_call_handlers_while_subscribing() {
    let host = SimulatedHost::new("/welcome");
    let repo = InMemoryRepository::new();
    let recorder = Recorder::new(
        RecorderConfig::default(),
        fixed_clock(),
        Arc::new(ReplayingHost {
            inner: host.clone(),
        }),
        &Storage::from_backend(repo.clone()),
        Arc::new(repo.clone()),
    );

    recorder.start().settle().await.unwrap();
    assert_eq!(paths(&recorder), ["/welcome"]);
    assert_eq!(host.navigation_subscribers(), 1);

    host.push("/next");
    let_writes_land().await;
    assert_eq!(paths(&recorder), ["/welcome", "/next"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_flushes_keep_the_latest_snapshot() {
    for round in 0..50 {
        let dir = tempfile::tempdir().unwrap();
        let local = FileLocalStore::new(dir.path().join("telemetry"));
        let repo = InMemoryRepository::new();
        let host = SimulatedHost::new("/");
        let recorder = Recorder::new(
            RecorderConfig::default(),
            fixed_clock(),
            Arc::new(host),
            &Storage::from_backend(repo.clone()),
            Arc::new(local.clone()),
        );
        recorder.start().settle().await.unwrap();

        let hidden = recorder.visibility_changed(Visibility::Hidden);
        recorder.track_page_view("/later").detach();
        let closed = recorder.unload();
        hidden
            .settle()
            .await
            .unwrap_or_else(|e| panic!("round {round}: {e}"));
        closed
            .settle()
            .await
            .unwrap_or_else(|e| panic!("round {round}: {e}"));

        let backup = std::fs::read_to_string(local.path_for(DEFAULT_SNAPSHOT_KEY)).unwrap();
        let snapshot: SessionSnapshot = serde_json::from_str(&backup).unwrap();
        assert_eq!(snapshot.page_view_count, 2, "round {round}");
        assert_eq!(
            repo.session(recorder.session_id()).unwrap().page_view_count,
            2,
            "round {round}"
        );
    }
}
