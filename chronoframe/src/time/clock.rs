//! The time source every frame schedules against.
//!
//! Wall-clock capture is an explicit dependency rather than an ambient
//! global: a `Clock` pairs an epoch origin with a `tokio::time::Instant`
//! anchor, so `now_ms` advances with Tokio's clock. Under
//! `tokio::test(start_paused = true)` the anchor is virtual, which makes
//! every timer in this crate deterministic in tests.

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// A millisecond-resolution time source.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin_ms: f64,
    anchor: Instant,
}

impl Clock {
    /// A clock anchored at the host's current wall-clock time.
    pub fn system() -> Self {
        let origin = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            origin_ms: origin.as_millis() as f64,
            anchor: Instant::now(),
        }
    }

    /// A clock whose "now" starts at `origin_ms` and advances from there.
    ///
    /// Intended for tests: combined with a paused Tokio runtime this pins
    /// the entire schedule to a known origin.
    pub fn fixed(origin_ms: f64) -> Self {
        Self {
            origin_ms,
            anchor: Instant::now(),
        }
    }

    /// The current absolute time in milliseconds since the epoch.
    pub fn now_ms(&self) -> f64 {
        self.origin_ms + self.anchor.elapsed().as_secs_f64() * 1000.0
    }

    /// Sleeps until the absolute millisecond timestamp `target_ms`.
    ///
    /// Targets in the past (or non-finite targets) resolve immediately.
    pub async fn sleep_until_ms(&self, target_ms: f64) {
        let delta_ms = target_ms - self.now_ms();
        if delta_ms.is_finite() && delta_ms > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(delta_ms / 1000.0)).await;
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::system()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fixed_clock_advances_with_virtual_time() {
        let clock = Clock::fixed(1_000.0);
        assert_eq!(clock.now_ms(), 1_000.0);

        tokio::time::advance(Duration::from_millis(250)).await;
        assert!((clock.now_ms() - 1_250.0).abs() < 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_until_past_target_returns_immediately() {
        let clock = Clock::fixed(5_000.0);
        clock.sleep_until_ms(0.0).await;
        clock.sleep_until_ms(f64::NEG_INFINITY).await;
        assert_eq!(clock.now_ms(), 5_000.0);
    }
}
