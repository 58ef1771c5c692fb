//! Reusable deadline timer guarding blocking phases of the connection.

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{Instant, Sleep, sleep_until};

/// A single re-armable watchdog timer.
///
/// Armed before every phase that can block (the connect chain, each read),
/// disarmed when the phase completes. While disarmed, [`Watchdog::expired`]
/// never resolves, so it can sit in a `select!` arm unconditionally.
pub struct Watchdog {
    sleep: Pin<Box<Sleep>>,
    armed: bool,
}

impl Watchdog {
    pub fn new() -> Self {
        Self {
            sleep: Box::pin(sleep_until(Instant::now())),
            armed: false,
        }
    }

    /// Arm (or re-arm) the watchdog with a fresh deadline.
    pub fn arm(&mut self, timeout: Duration) {
        self.sleep.as_mut().reset(Instant::now() + timeout);
        self.armed = true;
    }

    /// Cancel the pending deadline. Disarming after the deadline has
    /// already passed is a no-op from the timer's point of view; callers
    /// simply stop observing the expiry.
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Resolves once the armed deadline passes; pends forever while disarmed.
    pub async fn expired(&mut self) {
        if !self.armed {
            pending::<()>().await;
        }
        self.sleep.as_mut().await;
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test]
    async fn fires_after_deadline() {
        let mut wd = Watchdog::new();
        wd.arm(Duration::from_millis(20));
        timeout(Duration::from_secs(2), wd.expired())
            .await
            .expect("armed watchdog should fire");
    }

    #[tokio::test]
    async fn disarmed_watchdog_never_fires() {
        let mut wd = Watchdog::new();
        wd.arm(Duration::from_millis(10));
        wd.disarm();
        assert!(
            timeout(Duration::from_millis(100), wd.expired())
                .await
                .is_err(),
            "disarmed watchdog must not fire"
        );
    }

    #[tokio::test]
    async fn rearm_replaces_deadline() {
        let mut wd = Watchdog::new();
        wd.arm(Duration::from_secs(60));
        wd.arm(Duration::from_millis(20));
        timeout(Duration::from_secs(2), wd.expired())
            .await
            .expect("re-armed watchdog should use the new deadline");
    }

    #[tokio::test]
    async fn reusable_after_expiry() {
        let mut wd = Watchdog::new();
        wd.arm(Duration::from_millis(10));
        wd.expired().await;
        wd.disarm();
        wd.arm(Duration::from_millis(10));
        timeout(Duration::from_secs(2), wd.expired())
            .await
            .expect("watchdog should be reusable after firing");
    }
}
