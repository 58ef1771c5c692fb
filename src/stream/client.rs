//! The streaming client actor: connect chain, inbound loop, outbound queue.

use super::dial::{Dialer, Endpoint, Phase, WsStream};
use super::watchdog::Watchdog;
use super::{Command, Shared, StreamHandle};
use futures_util::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

/// Outcome of one `select!` pass while dialing.
enum DialEvent {
    Command(Option<Command>),
    TimedOut,
    Done(Result<(WsStream, Dialer), crate::error::StreamError>),
}

/// Outcome of one `select!` pass in the read loop.
enum Step {
    Enqueue(String),
    StopRequested,
    CommandsClosed,
    TimedOut,
    Frame(Option<Result<WsMessage, WsError>>),
}

/// A streaming client bound to one endpoint and one consumer.
///
/// Construct with [`StreamClient::new`], then drive with [`StreamClient::run`]
/// exactly once. The paired [`StreamHandle`] stays valid for the life of the
/// run and is the only way to reach the client from outside.
pub struct StreamClient {
    endpoint: Endpoint,
    shared: Arc<Shared>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    commands_open: bool,
    queue: VecDeque<String>,
    watchdog: Watchdog,
    frames: mpsc::UnboundedSender<String>,
    phase: Phase,
}

impl StreamClient {
    /// Create a client targeting `endpoint`. Decoded text payloads are
    /// delivered to `frames`; the client never inspects their content.
    pub fn new(endpoint: Endpoint, frames: mpsc::UnboundedSender<String>) -> (Self, StreamHandle) {
        let shared = Arc::new(Shared::new());
        let (tx, cmd_rx) = mpsc::unbounded_channel();
        let handle = StreamHandle {
            shared: Arc::clone(&shared),
            tx,
        };
        let client = Self {
            endpoint,
            shared,
            cmd_rx,
            commands_open: true,
            queue: VecDeque::new(),
            watchdog: Watchdog::new(),
            frames,
            phase: Phase::Idle,
        };
        (client, handle)
    }

    /// Attempt the connection and, on success, run the inbound loop until
    /// stopped or the stream ends.
    ///
    /// `connect_timeout` is a single deadline covering the entire
    /// resolve-through-upgrade chain; `read_timeout` is re-armed before each
    /// individual read. Outcome is observed through logs, `is_connected()`,
    /// and the stop callback; nothing is returned.
    pub async fn run(mut self, connect_timeout: Duration, read_timeout: Duration) {
        info!(
            host = %self.endpoint.host,
            port = self.endpoint.port,
            path = %self.endpoint.path,
            tls = self.endpoint.tls,
            "starting stream client"
        );

        self.watchdog.arm(connect_timeout);
        let dial = Dialer::new(self.endpoint.clone()).dial();
        tokio::pin!(dial);

        let mut ws = loop {
            let commands_open = self.commands_open;
            let event = tokio::select! {
                biased;
                cmd = self.cmd_rx.recv(), if commands_open => DialEvent::Command(cmd),
                () = self.watchdog.expired() => DialEvent::TimedOut,
                res = &mut dial => DialEvent::Done(res),
            };
            match event {
                DialEvent::Command(Some(Command::Send(msg))) => {
                    // Queued until connected; never flushed if we never get there.
                    self.queue.push_back(msg);
                }
                DialEvent::Command(Some(Command::Stop)) => {
                    self.watchdog.disarm();
                    self.transition(Phase::Closed);
                    self.signal_stopped();
                    self.drain_queued_stops();
                    info!("stopped before connection established");
                    return;
                }
                DialEvent::Command(None) => {
                    self.commands_open = false;
                }
                DialEvent::TimedOut => {
                    // Dropping the dial future severs the partial transport.
                    error!(host = %self.endpoint.host, "connection timeout");
                    self.transition(Phase::Closed);
                    return;
                }
                DialEvent::Done(res) => {
                    self.watchdog.disarm();
                    match res {
                        Ok((ws, dialer)) => {
                            self.phase = dialer.phase();
                            break ws;
                        }
                        Err(e) => {
                            error!(error = %e, code = e.error_code(), "connection failed");
                            self.transition(Phase::Closed);
                            return;
                        }
                    }
                }
            }
        };

        self.shared.connected.store(true, Ordering::SeqCst);

        // Flush anything queued while the connection was being established.
        if !self.queue.is_empty() {
            if let Err(e) = self.flush(&mut ws).await {
                warn!(error = %e, "write failed; shutting down");
                self.shutdown(&mut ws).await;
                self.transition(Phase::Closed);
                return;
            }
        }

        info!(timeout_secs = read_timeout.as_secs(), "read loop started");
        self.read_loop(&mut ws, read_timeout).await;
        self.transition(Phase::Closed);
    }

    async fn read_loop(&mut self, ws: &mut WsStream, read_timeout: Duration) {
        'read: loop {
            if self.shared.stopping.load(Ordering::SeqCst) {
                debug!("stop requested; leaving read loop");
                break;
            }
            // Per-read deadline: armed before the read, untouched while
            // commands interleave with it.
            self.watchdog.arm(read_timeout);
            loop {
                match self.next_step(ws).await {
                    Step::Enqueue(msg) => {
                        self.queue.push_back(msg);
                        if let Err(e) = self.flush(ws).await {
                            warn!(error = %e, "write failed; shutting down");
                            self.shutdown(ws).await;
                            break 'read;
                        }
                    }
                    Step::StopRequested => {
                        self.shutdown(ws).await;
                        self.drain_queued_stops_with(ws).await;
                        break 'read;
                    }
                    Step::CommandsClosed => {}
                    Step::TimedOut => {
                        // Direct notification, deliberately not the stop path.
                        warn!("read timeout; severing connection");
                        let _ = ws.close(None).await;
                        self.notify_stopped();
                        break 'read;
                    }
                    Step::Frame(frame) => {
                        self.watchdog.disarm();
                        if self.shared.stopping.load(Ordering::SeqCst) {
                            debug!("stopped while read in flight; discarding result");
                            break 'read;
                        }
                        match frame {
                            Some(Ok(WsMessage::Text(text))) => {
                                debug!(bytes = text.len(), "frame received");
                                if self.frames.send(text).is_err() {
                                    debug!("frame consumer dropped; discarding");
                                }
                                continue 'read;
                            }
                            Some(Ok(WsMessage::Binary(data))) => {
                                debug!(bytes = data.len(), "binary frame received");
                                let text = String::from_utf8_lossy(&data).into_owned();
                                if self.frames.send(text).is_err() {
                                    debug!("frame consumer dropped; discarding");
                                }
                                continue 'read;
                            }
                            Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => continue 'read,
                            Some(Ok(WsMessage::Close(frame))) => {
                                // Clean close: exit silently, no flag flip.
                                info!(frame = ?frame, "close frame received");
                                break 'read;
                            }
                            Some(Ok(WsMessage::Frame(_))) => continue 'read,
                            Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                                info!("connection closed by peer");
                                break 'read;
                            }
                            Some(Err(e)) => {
                                warn!(error = %e, "read failed; shutting down");
                                self.shutdown(ws).await;
                                break 'read;
                            }
                            None => {
                                info!("stream ended");
                                break 'read;
                            }
                        }
                    }
                }
            }
        }
        self.watchdog.disarm();
    }

    async fn next_step(&mut self, ws: &mut WsStream) -> Step {
        let commands_open = self.commands_open;
        tokio::select! {
            biased;
            cmd = self.cmd_rx.recv(), if commands_open => match cmd {
                Some(Command::Send(msg)) => Step::Enqueue(msg),
                Some(Command::Stop) => Step::StopRequested,
                None => {
                    self.commands_open = false;
                    Step::CommandsClosed
                }
            },
            () = self.watchdog.expired() => Step::TimedOut,
            frame = ws.next() => Step::Frame(frame),
        }
    }

    /// Write queued messages head-first. The head stays queued until its
    /// write completes, so exactly one message is ever in flight.
    async fn flush(&mut self, ws: &mut WsStream) -> Result<(), WsError> {
        while let Some(front) = self.queue.front() {
            ws.send(WsMessage::Text(front.clone())).await?;
            debug!(bytes = front.len(), "message sent");
            self.queue.pop_front();
        }
        Ok(())
    }

    /// The full stop path: flag, graceful close, disconnect, callback.
    async fn shutdown(&mut self, ws: &mut WsStream) {
        self.shared.stopping.store(true, Ordering::SeqCst);
        if self.phase != Phase::Stopping {
            self.transition(Phase::Stopping);
        }
        // Harmless when the stream is already closed.
        let _ = ws.close(None).await;
        self.signal_stopped();
    }

    /// Process stop commands already queued behind the one being handled,
    /// so each `stop()` call gets its own callback invocation.
    async fn drain_queued_stops_with(&mut self, ws: &mut WsStream) {
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            match cmd {
                Command::Stop => self.shutdown(ws).await,
                Command::Send(msg) => self.queue.push_back(msg),
            }
        }
    }

    /// Pre-connect variant: no stream exists to close.
    fn drain_queued_stops(&mut self) {
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            match cmd {
                Command::Stop => self.signal_stopped(),
                Command::Send(msg) => self.queue.push_back(msg),
            }
        }
    }

    fn signal_stopped(&self) {
        self.shared.connected.store(false, Ordering::SeqCst);
        self.notify_stopped();
    }

    fn notify_stopped(&self) {
        // Clone the callback out of the lock so it can re-register itself.
        let callback = self.shared.stop_callback.lock().clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    fn transition(&mut self, next: Phase) {
        match self.phase.advance(next) {
            Ok(phase) => {
                debug!(from = ?self.phase, to = ?phase, "lifecycle phase");
                self.phase = phase;
            }
            Err(e) => warn!(error = %e, "illegal phase transition ignored"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio::time::{sleep, timeout};
    use tokio_tungstenite::accept_async;

    // A stop can land while a read is already in flight. The completed
    // read must be discarded at the top of the handler, not delivered.
    // The flag is set directly so the frame arm, not the command arm,
    // observes the stop.
    #[tokio::test]
    async fn frame_completing_after_stop_flag_is_discarded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (push_tx, push_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(stream).await.expect("upgrade");
            let _ = push_rx.await;
            let _ = ws.send(WsMessage::Text("late".to_string())).await;
            while let Some(Ok(_)) = ws.next().await {}
        });

        let endpoint = Endpoint {
            host: "127.0.0.1".to_string(),
            port: addr.port(),
            path: "/".to_string(),
            tls: false,
        };
        let (frames_tx, mut frames_rx) = mpsc::unbounded_channel();
        let (client, handle) = StreamClient::new(endpoint, frames_tx);
        let run = tokio::spawn(client.run(Duration::from_secs(5), Duration::from_secs(30)));

        for _ in 0..200 {
            if handle.is_connected() {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert!(handle.is_connected(), "client never connected");

        // Flag first, frame second: the read is pending when both happen.
        handle.shared.stopping.store(true, Ordering::SeqCst);
        push_tx.send(()).expect("server task should be alive");

        timeout(Duration::from_secs(2), run)
            .await
            .expect("run should return once the stale read is discarded")
            .expect("client task should not panic");
        assert!(
            frames_rx.recv().await.is_none(),
            "discarded frame must not reach the consumer"
        );
    }
}
