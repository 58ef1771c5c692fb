//! Frame consumer for collected market data.
//!
//! The collector is the external message-received collaborator of the
//! streaming client: it receives decoded text frames over a channel and
//! tracks collection statistics. Payload interpretation (quote decoding,
//! chart construction) happens downstream of this crate.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::debug;

/// Accumulates frames handed off by the streaming client.
pub struct Collector {
    frames_seen: u64,
    bytes_seen: u64,
    first_frame_at: Option<DateTime<Utc>>,
    last_frame_at: Option<DateTime<Utc>>,
}

impl Collector {
    pub fn new() -> Self {
        Self {
            frames_seen: 0,
            bytes_seen: 0,
            first_frame_at: None,
            last_frame_at: None,
        }
    }

    /// Record one received frame.
    pub fn accept(&mut self, frame: &str) {
        let now = Utc::now();
        self.frames_seen += 1;
        self.bytes_seen += frame.len() as u64;
        if self.first_frame_at.is_none() {
            self.first_frame_at = Some(now);
        }
        self.last_frame_at = Some(now);
        debug!(bytes = frame.len(), total = self.frames_seen, "frame collected");
    }

    /// Drain the frame channel until the client drops its sender.
    pub async fn run(mut self, mut frames: mpsc::UnboundedReceiver<String>) -> Self {
        while let Some(frame) = frames.recv().await {
            self.accept(&frame);
        }
        self
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    pub fn bytes_seen(&self) -> u64 {
        self.bytes_seen
    }

    pub fn first_frame_at(&self) -> Option<DateTime<Utc>> {
        self.first_frame_at
    }

    pub fn last_frame_at(&self) -> Option<DateTime<Utc>> {
        self.last_frame_at
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_frames_and_bytes() {
        let mut collector = Collector::new();
        collector.accept("abc");
        collector.accept("defgh");
        assert_eq!(collector.frames_seen(), 2);
        assert_eq!(collector.bytes_seen(), 8);
        assert!(collector.first_frame_at().is_some());
        assert!(collector.last_frame_at() >= collector.first_frame_at());
    }

    #[tokio::test]
    async fn run_drains_until_sender_drops() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send("one".to_string()).expect("send");
        tx.send("two".to_string()).expect("send");
        drop(tx);
        let collector = Collector::new().run(rx).await;
        assert_eq!(collector.frames_seen(), 2);
    }
}
