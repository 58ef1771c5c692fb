//! Integration test common infrastructure.
//!
//! Provides an in-process WebSocket feed the streaming client can connect
//! to, with hooks to observe messages it writes and to push frames at it.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Commands a test can issue to the feed.
pub enum FeedControl {
    /// Push a text frame to the connected client.
    Push(String),
    /// Close the connection gracefully.
    Close,
}

/// A single-connection WebSocket test feed.
pub struct TestFeed {
    pub addr: SocketAddr,
    pub control: mpsc::UnboundedSender<FeedControl>,
    pub received: mpsc::UnboundedReceiver<String>,
}

impl TestFeed {
    /// Bind a listener on an ephemeral port and serve one connection.
    pub async fn spawn() -> TestFeed {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind feed");
        let addr = listener.local_addr().expect("feed local addr");
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (received_tx, received_rx) = mpsc::unbounded_channel();
        tokio::spawn(serve(listener, control_rx, received_tx));
        TestFeed {
            addr,
            control: control_tx,
            received: received_rx,
        }
    }

    pub fn push(&self, frame: &str) {
        let _ = self.control.send(FeedControl::Push(frame.to_string()));
    }

    pub fn close(&self) {
        let _ = self.control.send(FeedControl::Close);
    }
}

async fn serve(
    listener: TcpListener,
    mut control: mpsc::UnboundedReceiver<FeedControl>,
    received: mpsc::UnboundedSender<String>,
) {
    let Ok((stream, _)) = listener.accept().await else {
        return;
    };
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };
    loop {
        tokio::select! {
            ctrl = control.recv() => match ctrl {
                Some(FeedControl::Push(frame)) => {
                    if ws.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                Some(FeedControl::Close) => {
                    // Keep polling afterwards so the close handshake completes.
                    let _ = ws.close(None).await;
                }
                None => break,
            },
            msg = ws.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let _ = received.send(text);
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            },
        }
    }
}

/// TCP endpoint that accepts connections but never answers the upgrade,
/// used to exercise the connect watchdog.
pub async fn spawn_black_hole() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind black hole");
    let addr = listener.local_addr().expect("black hole local addr");
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    addr
}
