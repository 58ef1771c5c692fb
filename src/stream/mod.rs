//! Resilient secure streaming client.
//!
//! One actor task owns the upgraded stream, the watchdog, and the outbound
//! queue; external callers reach it only through [`StreamHandle`], which
//! hands commands to the task over a channel. That single-owner discipline
//! is the only synchronization in the module: all socket, timer, and
//! queue mutation happens serialized on the client task.

mod client;
mod dial;
mod scheduler;
mod watchdog;

pub use client::StreamClient;
pub use dial::{Dialer, Endpoint, Phase, StreamTransport, WsStream};
pub use scheduler::StopScheduler;
pub use watchdog::Watchdog;

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// Zero-argument hook invoked on every stop completion and on every
/// read-timeout forced close.
pub type StopCallback = Arc<dyn Fn() + Send + Sync>;

/// Work handed to the client task by external callers.
pub(crate) enum Command {
    Send(String),
    Stop,
}

/// State shared between the client task and its handles.
pub(crate) struct Shared {
    pub(crate) stopping: AtomicBool,
    pub(crate) connected: AtomicBool,
    pub(crate) stop_callback: Mutex<Option<StopCallback>>,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            stopping: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            stop_callback: Mutex::new(None),
        }
    }
}

/// Cross-thread API for a running [`StreamClient`].
///
/// Cloneable; all methods are safe to call from any thread at any time,
/// including before the connection exists or after it is torn down.
#[derive(Clone)]
pub struct StreamHandle {
    pub(crate) shared: Arc<Shared>,
    pub(crate) tx: mpsc::UnboundedSender<Command>,
}

impl StreamHandle {
    /// Queue a text message for transmission.
    ///
    /// Messages are written to the wire in the exact order `send` calls are
    /// accepted, with at most one write in flight. Messages queued while
    /// never connected are never flushed.
    pub fn send(&self, message: impl Into<String>) {
        let _ = self.tx.send(Command::Send(message.into()));
    }

    /// Begin shutdown: graceful protocol close if open, connected flag
    /// cleared, stop callback invoked.
    ///
    /// The stop flag is set synchronously so callers can observe it without
    /// waiting for the client task. Each call schedules its own invocation
    /// of the stop callback; callers wanting at-most-once semantics must
    /// call `stop` once or register an idempotent callback.
    pub fn stop(&self) {
        self.shared.stopping.store(true, Ordering::SeqCst);
        let _ = self.tx.send(Command::Stop);
    }

    /// Lock-free read of the connected flag.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Whether a stop has been requested.
    pub fn is_stopping(&self) -> bool {
        self.shared.stopping.load(Ordering::SeqCst)
    }

    /// Register the stop-completion callback, replacing any previous one.
    pub fn set_stop_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.shared.stop_callback.lock() = Some(Arc::new(callback));
    }
}
