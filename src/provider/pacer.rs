//! Request pacing for rate-limited provider accounts.

use std::time::Duration;

use tokio::time::sleep;

/// Fixed pause applied before every outbound provider request.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Pacer {
    interval: Duration,
}

impl Pacer {
    /// Creates a pacer that waits `interval` before each request.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Creates a pacer from a millisecond value as found in configuration.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }

    /// Returns the configured pause.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Sleeps for the configured interval; returns immediately when zero.
    pub async fn pause(&self) {
        if !self.interval.is_zero() {
            sleep(self.interval).await;
        }
    }
}
