//! Cancellation token for cooperative cancellation.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tracing::warn;

/// A callback type for cancellation notifications.
pub type CancelCallback = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
    callbacks: Mutex<Vec<CancelCallback>>,
    children: Mutex<Vec<Weak<Inner>>>,
    parent: Weak<Inner>,
    notify: Notify,
}

impl Inner {
    fn cancel(&self, reason: String) {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        *self.reason.write() = Some(reason.clone());
        self.notify.notify_waiters();

        let callbacks = std::mem::take(&mut *self.callbacks.lock());
        for callback in &callbacks {
            invoke(callback.as_ref());
        }

        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel(reason.clone());
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // A dropped child unregisters itself (and any other dead sibling).
        if let Some(parent) = self.parent.upgrade() {
            parent.children.lock().retain(|c| c.strong_count() > 0);
        }
    }
}

fn invoke(callback: &(dyn Fn() + Send + Sync)) {
    if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(callback)) {
        warn!("Cancellation callback panicked: {:?}", e);
    }
}

/// A shareable token for cooperative cancellation.
///
/// Clones observe the same state. Only the first cancellation reason is kept.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation with a reason.
    ///
    /// Waiters are woken and callbacks invoked once. Panics in callbacks are
    /// logged and suppressed.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.inner.cancel(reason.into());
    }

    /// Creates a token that is cancelled whenever this one is, but can also
    /// be cancelled on its own without affecting this one.
    ///
    /// The parent only keeps a weak reference, released when the last clone
    /// of the child is dropped.
    #[must_use]
    pub fn child_token(&self) -> Self {
        let child = Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                reason: RwLock::new(None),
                callbacks: Mutex::new(Vec::new()),
                children: Mutex::new(Vec::new()),
                parent: Arc::downgrade(&self.inner),
                notify: Notify::new(),
            }),
        };
        {
            let mut children = self.inner.children.lock();
            if !self.is_cancelled() {
                children.push(Arc::downgrade(&child.inner));
                return child;
            }
        }
        child.cancel(self.reason().unwrap_or_else(|| "cancelled".to_string()));
        child
    }

    /// Registers a callback to be invoked on cancellation.
    ///
    /// If already cancelled, the callback is invoked immediately.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        {
            let mut callbacks = self.inner.callbacks.lock();
            if !self.is_cancelled() {
                callbacks.push(Box::new(callback));
                return;
            }
        }
        invoke(&callback);
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.read().clone()
    }

    /// Waits until the token is cancelled.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}
