//! Deferred stop scheduling.
//!
//! A general-purpose one-shot timer used to trigger shutdown from outside
//! the client, e.g. a max-runtime policy binding the timer to
//! `StreamHandle::stop`. Unrelated to the client's own watchdog.

use std::time::Duration;
use tokio::task::JoinHandle;

/// Owns at most one pending deferred action.
pub struct StopScheduler {
    pending: Option<JoinHandle<()>>,
}

impl StopScheduler {
    pub fn new() -> Self {
        Self { pending: None }
    }

    /// Arm a one-shot timer that invokes `callback` after `delay`.
    /// Re-scheduling cancels the previous timer; a cancelled timer never
    /// invokes its callback.
    pub fn schedule<F>(&mut self, delay: Duration, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        }));
    }

    /// Cancel the pending timer, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

impl Default for StopScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StopScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
