use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use telemetry_core::model::EnvironmentInfo;

use super::{
    HostEnvironment, LifecycleEvent, LifecycleHandler, LifecycleSource, NavigationEvent,
    NavigationHandler, NavigationKind, NavigationSource, Subscription, Visibility,
};

struct HostState {
    history: Vec<String>,
    cursor: usize,
    title: String,
    referrer: Option<String>,
    environment: EnvironmentInfo,
    next_id: u64,
    navigation: Vec<(u64, NavigationHandler)>,
    lifecycle: Vec<(u64, LifecycleHandler)>,
}

/// Scriptable in-process host with a history stack and lifecycle controls.
///
/// Handlers are invoked after the host's own lock is released, so they may
/// query the host again.
#[derive(Clone)]
pub struct SimulatedHost {
    state: Arc<Mutex<HostState>>,
}

impl SimulatedHost {
    #[must_use]
    pub fn new(initial_location: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(HostState {
                history: vec![initial_location.into()],
                cursor: 0,
                title: String::new(),
                referrer: None,
                environment: EnvironmentInfo {
                    user_agent: "SimulatedHost/1.0".into(),
                    language: "en-US".into(),
                    platform: std::env::consts::OS.into(),
                    screen: "1920x1080".into(),
                    viewport: "1280x720".into(),
                    timezone: "UTC".into(),
                },
                next_id: 0,
                navigation: Vec::new(),
                lifecycle: Vec::new(),
            })),
        }
    }

    #[must_use]
    pub fn with_referrer(self, referrer: impl Into<String>) -> Self {
        self.guard().referrer = Some(referrer.into());
        self
    }

    #[must_use]
    pub fn with_environment(self, environment: EnvironmentInfo) -> Self {
        self.guard().environment = environment;
        self
    }

    pub fn set_title(&self, title: impl Into<String>) {
        self.guard().title = title.into();
    }

    /// In-app navigation adding a history entry; forward history is discarded.
    pub fn push(&self, location: impl Into<String>) {
        let location = location.into();
        {
            let mut guard = self.guard();
            let keep = guard.cursor + 1;
            guard.history.truncate(keep);
            guard.history.push(location.clone());
            guard.cursor += 1;
        }
        self.emit_navigation(NavigationKind::Push, location);
    }

    /// In-app navigation replacing the current history entry.
    pub fn replace(&self, location: impl Into<String>) {
        let location = location.into();
        {
            let mut guard = self.guard();
            let cursor = guard.cursor;
            guard.history[cursor].clone_from(&location);
        }
        self.emit_navigation(NavigationKind::Replace, location);
    }

    /// Browser back button. Returns `false` at the start of history.
    pub fn back(&self) -> bool {
        self.traverse(-1)
    }

    /// Browser forward button. Returns `false` at the end of history.
    pub fn forward(&self) -> bool {
        self.traverse(1)
    }

    pub fn hide(&self) {
        self.emit_lifecycle(LifecycleEvent::VisibilityChanged(Visibility::Hidden));
    }

    pub fn show(&self) {
        self.emit_lifecycle(LifecycleEvent::VisibilityChanged(Visibility::Visible));
    }

    pub fn unload(&self) {
        self.emit_lifecycle(LifecycleEvent::Unload);
    }

    #[must_use]
    pub fn navigation_subscribers(&self) -> usize {
        self.guard().navigation.len()
    }

    #[must_use]
    pub fn lifecycle_subscribers(&self) -> usize {
        self.guard().lifecycle.len()
    }

    fn traverse(&self, step: isize) -> bool {
        let location = {
            let mut guard = self.guard();
            let Some(target) = guard.cursor.checked_add_signed(step) else {
                return false;
            };
            if target >= guard.history.len() {
                return false;
            }
            guard.cursor = target;
            guard.history[target].clone()
        };
        self.emit_navigation(NavigationKind::Pop, location);
        true
    }

    fn emit_navigation(&self, kind: NavigationKind, location: String) {
        let handlers: Vec<NavigationHandler> = self
            .guard()
            .navigation
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        let event = NavigationEvent { kind, location };
        for handler in handlers {
            handler(&event);
        }
    }

    fn emit_lifecycle(&self, event: LifecycleEvent) {
        let handlers: Vec<LifecycleHandler> = self
            .guard()
            .lifecycle
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(event);
        }
    }

    fn guard(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn detacher(&self, id: u64, navigation: bool) -> Subscription {
        let weak: Weak<Mutex<HostState>> = Arc::downgrade(&self.state);
        Subscription::new(move || {
            if let Some(state) = weak.upgrade() {
                let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
                if navigation {
                    guard.navigation.retain(|(existing, _)| *existing != id);
                } else {
                    guard.lifecycle.retain(|(existing, _)| *existing != id);
                }
            }
        })
    }
}

impl NavigationSource for SimulatedHost {
    fn on_navigate(&self, handler: NavigationHandler) -> Subscription {
        let id = {
            let mut guard = self.guard();
            guard.next_id += 1;
            let id = guard.next_id;
            guard.navigation.push((id, handler));
            id
        };
        self.detacher(id, true)
    }
}

impl LifecycleSource for SimulatedHost {
    fn on_lifecycle(&self, handler: LifecycleHandler) -> Subscription {
        let id = {
            let mut guard = self.guard();
            guard.next_id += 1;
            let id = guard.next_id;
            guard.lifecycle.push((id, handler));
            id
        };
        self.detacher(id, false)
    }
}

impl HostEnvironment for SimulatedHost {
    fn current_location(&self) -> String {
        let guard = self.guard();
        guard.history[guard.cursor].clone()
    }

    fn document_title(&self) -> String {
        self.guard().title.clone()
    }

    fn referrer(&self) -> Option<String> {
        self.guard().referrer.clone()
    }

    fn environment(&self) -> EnvironmentInfo {
        self.guard().environment.clone()
    }
}
