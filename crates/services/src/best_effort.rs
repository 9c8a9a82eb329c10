use std::future::Future;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::WriteError;

#[derive(Debug)]
enum Task {
    Spawned(JoinHandle<Result<(), WriteError>>),
    Unscheduled,
}

/// Handle to telemetry writes that were dispatched but not awaited.
///
/// Tracking calls return one of these instead of a `Result`: the writes run on
/// their own and log their failures. Dropping the handle (or calling `detach`)
/// is the normal thing to do; `settle` exists for shutdown paths and tests that
/// want to observe completion.
#[derive(Debug, Default)]
#[must_use = "call `.detach()` to make fire-and-forget intent explicit"]
pub struct BestEffort {
    tasks: Vec<Task>,
}

impl BestEffort {
    /// A handle with nothing in flight.
    pub(crate) fn none() -> Self {
        Self::default()
    }

    /// Dispatch `write` on the current runtime, logging its failure.
    pub(crate) fn spawn<F>(operation: &'static str, write: F) -> Self
    where
        F: Future<Output = Result<(), WriteError>> + Send + 'static,
    {
        let task = match Handle::try_current() {
            Ok(runtime) => Task::Spawned(runtime.spawn(async move {
                let result = write.await;
                if let Err(err) = &result {
                    warn!(operation, error = %err, "telemetry write failed");
                }
                result
            })),
            Err(_) => {
                warn!(operation, "no async runtime; telemetry write dropped");
                Task::Unscheduled
            }
        };
        Self { tasks: vec![task] }
    }

    /// Combine two handles so both are settled together.
    pub(crate) fn and(mut self, other: Self) -> Self {
        self.tasks.extend(other.tasks);
        self
    }

    /// Number of writes this handle covers.
    #[must_use]
    pub fn dispatched(&self) -> usize {
        self.tasks.len()
    }

    /// Let the writes finish unobserved.
    pub fn detach(self) {}

    /// Wait for every write and report the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first `WriteError` among the covered writes.
    pub async fn settle(self) -> Result<(), WriteError> {
        let mut first_error = None;
        for task in self.tasks {
            let outcome = match task {
                Task::Spawned(handle) => match handle.await {
                    Ok(result) => result,
                    Err(join) => Err(WriteError::Aborted(join.to_string())),
                },
                Task::Unscheduled => Err(WriteError::NoRuntime),
            };
            if let Err(err) = outcome {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
