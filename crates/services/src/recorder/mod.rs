//! Session/event recorder for one page load.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use storage::repository::{
    Collection, EventRepository, LocalStore, PageViewRepository, SchemaProvisioner,
    SessionRepository, Storage,
};
use telemetry_core::Clock;
use telemetry_core::model::{
    Attributes, Event, EventName, PagePath, PageView, PhaseTransition, RecorderPhase, Session,
    SessionId, SessionSnapshot, SnapshotContext, UserId,
};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::best_effort::BestEffort;
use crate::error::WriteError;
use crate::host::{BrowserHost, LifecycleEvent, NavigationEvent, Subscription, Visibility};

mod trackers;
mod writes;

use writes::write_with_provisioning;

/// Local storage key holding the most recent snapshot.
pub const DEFAULT_SNAPSHOT_KEY: &str = "lastSession";

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub snapshot_key: String,
    /// Provision a missing collection and retry once instead of giving up.
    pub provision_on_missing_schema: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            snapshot_key: DEFAULT_SNAPSHOT_KEY.to_owned(),
            provision_on_missing_schema: true,
        }
    }
}

struct Sinks {
    sessions: Arc<dyn SessionRepository>,
    page_views: Arc<dyn PageViewRepository>,
    events: Arc<dyn EventRepository>,
    provisioner: Option<Arc<dyn SchemaProvisioner>>,
    local: Arc<dyn LocalStore>,
}

struct RecorderState {
    phase: RecorderPhase,
    session: Session,
    user_id: Option<UserId>,
    last_seen: Option<PagePath>,
    subscriptions: Vec<Subscription>,
    clock: Clock,
    flushes_issued: u64,
}

/// A snapshot ordered by when it was taken.
struct Flush {
    seq: u64,
    snapshot: SessionSnapshot,
}

struct RecorderInner {
    config: RecorderConfig,
    host: Arc<dyn BrowserHost>,
    sinks: Sinks,
    state: Mutex<RecorderState>,
    /// Sequence number of the newest flush written so far.
    flushed: Arc<AsyncMutex<u64>>,
}

/// Owns one session and records page views, events and snapshots for it.
///
/// Cloning is cheap and yields a handle to the same session. All recording
/// methods update the in-memory session synchronously, then dispatch the
/// remote write and return a `BestEffort` handle; none of them report errors.
#[derive(Clone)]
pub struct Recorder {
    inner: Arc<RecorderInner>,
}

impl Recorder {
    /// Create a recorder with a fresh session id. Nothing is observed until `start`.
    #[must_use]
    pub fn new(
        config: RecorderConfig,
        clock: Clock,
        host: Arc<dyn BrowserHost>,
        storage: &Storage,
        local: Arc<dyn LocalStore>,
    ) -> Self {
        let provisioner = config
            .provision_on_missing_schema
            .then(|| Arc::clone(&storage.provisioner));
        let sinks = Sinks {
            sessions: Arc::clone(&storage.sessions),
            page_views: Arc::clone(&storage.page_views),
            events: Arc::clone(&storage.events),
            provisioner,
            local,
        };
        let state = RecorderState {
            phase: RecorderPhase::Idle,
            session: Session::new(SessionId::generate(), clock.now()),
            user_id: None,
            last_seen: None,
            subscriptions: Vec::new(),
            clock,
            flushes_issued: 0,
        };
        Self {
            inner: Arc::new(RecorderInner {
                config,
                host,
                sinks,
                state: Mutex::new(state),
                flushed: Arc::new(AsyncMutex::new(0)),
            }),
        }
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.state().session.id()
    }

    #[must_use]
    pub fn phase(&self) -> RecorderPhase {
        self.state().phase
    }

    /// Page views recorded so far, in recording order.
    #[must_use]
    pub fn page_views(&self) -> Vec<PageView> {
        self.state().session.page_views().to_vec()
    }

    /// Elapsed session time; never smaller than a previously returned value.
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        let mut guard = self.state();
        let state = &mut *guard;
        state.session.refresh_duration(state.clock.now())
    }

    /// Attribute subsequent records to `user_id` (or to nobody).
    pub fn identify(&self, user_id: Option<UserId>) {
        self.state().user_id = user_id;
    }

    /// Begin tracking: record the current location, subscribe to the host and flush.
    ///
    /// Calling it again after the first time has no effect. Host subscriptions are
    /// made without holding the recorder's lock, so a host may deliver an event to
    /// a handler while it is being registered.
    pub fn start(&self) -> BestEffort {
        let (view, flush) = {
            let mut guard = self.state();
            let state = &mut *guard;
            match state.phase.apply(PhaseTransition::Start) {
                Ok(next) => state.phase = next,
                Err(err) => {
                    debug!(session_id = %state.session.id(), %err, "start ignored");
                    return BestEffort::none();
                }
            }
            let location = PagePath::from_location(&self.inner.host.current_location());
            let view = self.record_locked(state, location);
            (view, self.snapshot_locked(state))
        };

        let subscriptions = self.subscribe();
        let stale = {
            let mut guard = self.state();
            if guard.phase.is_terminated() {
                Some(subscriptions)
            } else {
                guard.subscriptions = subscriptions;
                None
            }
        };
        drop(stale);

        info!(session_id = %flush.snapshot.session_id, path = %view.path, "telemetry session started");
        self.dispatch_page_view(view)
            .and(self.dispatch_flush(flush))
    }

    /// Record a page view for `location` (URL or path).
    ///
    /// Explicit calls are never de-duplicated, even for an unchanged path.
    pub fn track_page_view(&self, location: &str) -> BestEffort {
        let view = {
            let mut guard = self.state();
            let state = &mut *guard;
            if state.phase.is_terminated() {
                debug!(session_id = %state.session.id(), location, "page view after unload ignored");
                return BestEffort::none();
            }
            self.record_locked(state, PagePath::from_location(location))
        };
        self.dispatch_page_view(view)
    }

    /// Record a discrete user action at the current location.
    pub fn track_event(&self, name: EventName, attributes: Attributes) -> BestEffort {
        let event = {
            let mut guard = self.state();
            let state = &mut *guard;
            if state.phase.is_terminated() {
                debug!(session_id = %state.session.id(), event = %name, "event after unload ignored");
                return BestEffort::none();
            }
            Event {
                session_id: state.session.id(),
                user_id: state.user_id.clone(),
                name,
                attributes,
                path: PagePath::from_location(&self.inner.host.current_location()),
                observed_at: state.clock.now(),
            }
        };
        self.dispatch_event(event)
    }

    /// React to the host's visibility: hiding flushes, showing resumes tracking.
    pub fn visibility_changed(&self, visibility: Visibility) -> BestEffort {
        let transition = match visibility {
            Visibility::Hidden => PhaseTransition::Background,
            Visibility::Visible => PhaseTransition::Resume,
        };
        let flush = {
            let mut guard = self.state();
            let state = &mut *guard;
            match state.phase.apply(transition) {
                Ok(next) => state.phase = next,
                Err(err) => {
                    debug!(session_id = %state.session.id(), %err, "visibility change ignored");
                    return BestEffort::none();
                }
            }
            match visibility {
                Visibility::Hidden => self.snapshot_locked(state),
                Visibility::Visible => return BestEffort::none(),
            }
        };
        self.dispatch_flush(flush)
    }

    /// Final flush; detaches from the host. The recorder ignores everything afterwards.
    pub fn unload(&self) -> BestEffort {
        let (flush, subscriptions) = {
            let mut guard = self.state();
            let state = &mut *guard;
            match state.phase.apply(PhaseTransition::Terminate) {
                Ok(next) => state.phase = next,
                Err(err) => {
                    debug!(session_id = %state.session.id(), %err, "unload ignored");
                    return BestEffort::none();
                }
            }
            (
                self.snapshot_locked(state),
                std::mem::take(&mut state.subscriptions),
            )
        };
        drop(subscriptions);
        info!(
            session_id = %flush.snapshot.session_id,
            duration_ms = flush.snapshot.duration_ms,
            page_views = flush.snapshot.page_view_count,
            "telemetry session ended"
        );
        self.dispatch_flush(flush)
    }

    fn observe_navigation(&self, event: &NavigationEvent) -> BestEffort {
        let path = PagePath::from_location(&event.location);
        let view = {
            let mut guard = self.state();
            let state = &mut *guard;
            if !state.phase.is_started() {
                return BestEffort::none();
            }
            if state.last_seen.as_ref() == Some(&path) {
                debug!(session_id = %state.session.id(), %path, kind = ?event.kind, "navigation to same path skipped");
                return BestEffort::none();
            }
            self.record_locked(state, path)
        };
        self.dispatch_page_view(view)
    }

    fn subscribe(&self) -> Vec<Subscription> {
        let weak = Arc::downgrade(&self.inner);
        let navigation = self.inner.host.on_navigate(Arc::new(move |event: &NavigationEvent| {
            if let Some(inner) = weak.upgrade() {
                Recorder { inner }.observe_navigation(event).detach();
            }
        }));

        let weak = Arc::downgrade(&self.inner);
        let lifecycle = self.inner.host.on_lifecycle(Arc::new(move |event: LifecycleEvent| {
            if let Some(inner) = weak.upgrade() {
                let recorder = Recorder { inner };
                match event {
                    LifecycleEvent::VisibilityChanged(visibility) => {
                        recorder.visibility_changed(visibility).detach();
                    }
                    LifecycleEvent::Unload => recorder.unload().detach(),
                }
            }
        }));

        vec![navigation, lifecycle]
    }

    fn record_locked(&self, state: &mut RecorderState, path: PagePath) -> PageView {
        let title = self.inner.host.document_title();
        let view = state
            .session
            .record_page_view(path.clone(), title, state.user_id.clone(), state.clock.now())
            .clone();
        state.last_seen = Some(path);
        view
    }

    fn snapshot_locked(&self, state: &mut RecorderState) -> Flush {
        let context = SnapshotContext {
            user_id: state.user_id.clone(),
            environment: self.inner.host.environment(),
            referrer: self.inner.host.referrer(),
        };
        state.flushes_issued += 1;
        Flush {
            seq: state.flushes_issued,
            snapshot: state.session.snapshot(context, state.clock.now()),
        }
    }

    fn provisioner(&self) -> Option<Arc<dyn SchemaProvisioner>> {
        self.inner.sinks.provisioner.clone()
    }

    fn dispatch_page_view(&self, view: PageView) -> BestEffort {
        let sink = Arc::clone(&self.inner.sinks.page_views);
        let provisioner = self.provisioner();
        BestEffort::spawn("page_view", async move {
            let (sink, view) = (&sink, &view);
            write_with_provisioning(provisioner.as_deref(), Collection::PageViews, move || {
                sink.append_page_view(view)
            })
            .await
        })
    }

    fn dispatch_event(&self, event: Event) -> BestEffort {
        let sink = Arc::clone(&self.inner.sinks.events);
        let provisioner = self.provisioner();
        BestEffort::spawn("event", async move {
            let (sink, event) = (&sink, &event);
            write_with_provisioning(provisioner.as_deref(), Collection::UserEvents, move || {
                sink.append_event(event)
            })
            .await
        })
    }

    /// Back up the snapshot locally, then upsert it remotely.
    ///
    /// Flushes run one at a time; a flush that finds a newer one already written
    /// is skipped, so the stored snapshot is always the latest taken.
    fn dispatch_flush(&self, flush: Flush) -> BestEffort {
        let sink = Arc::clone(&self.inner.sinks.sessions);
        let local = Arc::clone(&self.inner.sinks.local);
        let provisioner = self.provisioner();
        let key = self.inner.config.snapshot_key.clone();
        let flushed = Arc::clone(&self.inner.flushed);
        let Flush { seq, snapshot } = flush;

        BestEffort::spawn("session_flush", async move {
            let mut flushed = flushed.lock().await;
            if *flushed > seq {
                debug!(session_id = %snapshot.session_id, seq, "superseded flush skipped");
                return Ok(());
            }
            *flushed = seq;

            let backup = match serde_json::to_string(&snapshot) {
                Ok(json) => local
                    .put(&key, &json)
                    .await
                    .map_err(|source| WriteError::LocalBackup {
                        key: key.clone(),
                        source,
                    }),
                Err(err) => Err(WriteError::Encode(err)),
            };

            let (sink, snapshot) = (&sink, &snapshot);
            let remote =
                write_with_provisioning(provisioner.as_deref(), Collection::UserSessions, move || {
                    sink.upsert_session(snapshot)
                })
                .await;

            match (remote, backup) {
                (Err(remote), Err(backup)) => {
                    warn!(error = %backup, "session backup not written");
                    Err(remote)
                }
                (remote, backup) => remote.and(backup),
            }
        })
    }

    fn state(&self) -> MutexGuard<'_, RecorderState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn advance_clock(&self, delta: chrono::Duration) {
        self.state().clock.advance(delta);
    }
}
