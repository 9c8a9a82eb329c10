//! Seams between the recorder and the environment hosting it.
//!
//! The routing layer implements `NavigationSource`, the page shell implements
//! `LifecycleSource`, and both expose read-only facts through `HostEnvironment`.
//! The recorder only ever subscribes; it never wraps or replaces host functions.

use std::fmt;
use std::sync::Arc;

use telemetry_core::model::EnvironmentInfo;

mod simulated;

pub use simulated::SimulatedHost;

//
// ─── EVENTS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationKind {
    /// In-app route change adding a history entry.
    Push,
    /// In-app route change replacing the current history entry.
    Replace,
    /// Browser back/forward.
    Pop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationEvent {
    pub kind: NavigationKind,
    /// Location after the navigation, as reported by the host (URL or path).
    pub location: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    VisibilityChanged(Visibility),
    Unload,
}

pub type NavigationHandler = Arc<dyn Fn(&NavigationEvent) + Send + Sync>;
pub type LifecycleHandler = Arc<dyn Fn(LifecycleEvent) + Send + Sync>;

//
// ─── SUBSCRIPTION ──────────────────────────────────────────────────────────────
//

/// Keeps a handler registered; dropping it detaches the handler.
#[must_use = "dropping a Subscription detaches its handler immediately"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

pub trait NavigationSource: Send + Sync {
    /// Register `handler` for every in-app and back/forward navigation.
    fn on_navigate(&self, handler: NavigationHandler) -> Subscription;
}

pub trait LifecycleSource: Send + Sync {
    /// Register `handler` for visibility changes and page teardown.
    fn on_lifecycle(&self, handler: LifecycleHandler) -> Subscription;
}

pub trait HostEnvironment: Send + Sync {
    fn current_location(&self) -> String;
    fn document_title(&self) -> String;
    fn referrer(&self) -> Option<String>;
    fn environment(&self) -> EnvironmentInfo;
}

/// Everything the recorder needs from its host.
pub trait BrowserHost: HostEnvironment + NavigationSource + LifecycleSource {}

impl<T> BrowserHost for T where T: HostEnvironment + NavigationSource + LifecycleSource {}
