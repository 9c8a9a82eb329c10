use thiserror::Error;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("cannot {transition:?} while {from:?}")]
pub struct PhaseError {
    pub from: RecorderPhase,
    pub transition: PhaseTransition,
}

//
// ─── PHASE ────────────────────────────────────────────────────────────────────
//

/// Lifecycle of a recorder within one page load.
///
/// `Idle → Tracking → (Backgrounded ⇄ Tracking) → Terminated`. Terminated is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecorderPhase {
    #[default]
    Idle,
    Tracking,
    Backgrounded,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseTransition {
    Start,
    Background,
    Resume,
    Terminate,
}

impl RecorderPhase {
    /// Returns the phase reached by applying `transition`.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError` if the transition is not allowed from this phase.
    pub fn apply(self, transition: PhaseTransition) -> Result<Self, PhaseError> {
        use PhaseTransition as T;
        use RecorderPhase as P;

        match (self, transition) {
            (P::Idle, T::Start) => Ok(P::Tracking),
            (P::Tracking, T::Background) => Ok(P::Backgrounded),
            (P::Backgrounded, T::Resume) => Ok(P::Tracking),
            (P::Idle | P::Tracking | P::Backgrounded, T::Terminate) => Ok(P::Terminated),
            (from, transition) => Err(PhaseError { from, transition }),
        }
    }

    /// Hooks are installed (tracking or backgrounded).
    #[must_use]
    pub fn is_started(self) -> bool {
        matches!(self, RecorderPhase::Tracking | RecorderPhase::Backgrounded)
    }

    #[must_use]
    pub fn is_terminated(self) -> bool {
        matches!(self, RecorderPhase::Terminated)
    }
}
