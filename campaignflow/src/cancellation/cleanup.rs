//! Run-scoped cleanup registry.

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::{debug, warn};

type CleanupFn = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

struct CleanupEntry {
    name: String,
    callback: CleanupFn,
}

/// Registry for async cleanup actions, executed in LIFO order.
///
/// A runner registers resources it acquires for a run (provider sessions,
/// buffers) and drains the registry when the run ends, whatever the outcome.
#[derive(Default)]
pub struct CleanupRegistry {
    entries: Mutex<Vec<CleanupEntry>>,
}

impl CleanupRegistry {
    /// Creates a new cleanup registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a named cleanup action.
    pub fn register<F, Fut>(&self, name: impl Into<String>, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.entries.lock().push(CleanupEntry {
            name: name.into(),
            callback: Box::new(move || callback().boxed()),
        });
    }

    /// Removes all actions with the given name without running them.
    ///
    /// Returns true if anything was removed.
    pub fn unregister(&self, name: &str) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| e.name != name);
        entries.len() < before
    }

    /// Runs all actions in LIFO order, each bounded by `per_action_timeout`.
    ///
    /// Failures (panics, timeouts) are logged and returned as
    /// `(name, message)` pairs; they never stop later actions. The registry
    /// is empty afterwards.
    pub async fn run_all(&self, per_action_timeout: Duration) -> Vec<(String, String)> {
        let entries = std::mem::take(&mut *self.entries.lock());
        let mut failures = Vec::new();

        for entry in entries.into_iter().rev() {
            let name = entry.name;
            let fut = AssertUnwindSafe((entry.callback)()).catch_unwind();

            let message = match tokio::time::timeout(per_action_timeout, fut).await {
                Ok(Ok(())) => {
                    debug!(cleanup = %name, "Cleanup completed");
                    continue;
                }
                Ok(Err(panic)) => format!("Cleanup action panicked: {panic:?}"),
                Err(_) => format!("Cleanup action timed out after {per_action_timeout:?}"),
            };
            warn!(cleanup = %name, "{}", message);
            failures.push((name, message));
        }

        failures
    }

    /// Returns the number of pending cleanup actions.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.entries.lock().len()
    }
}

impl std::fmt::Debug for CleanupRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupRegistry")
            .field("pending_count", &self.pending_count())
            .finish()
    }
}
