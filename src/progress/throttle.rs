//! Progress event throttling

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default throttle interval in milliseconds
pub const DEFAULT_THROTTLE_INTERVAL_MS: u64 = 1000;

/// Time-based throttle for high-frequency progress updates
#[derive(Debug)]
pub struct ProgressThrottler {
    origin: Instant,
    /// Nanoseconds since `origin` of the last emission, `u64::MAX` before the first
    last_emit_nanos: AtomicU64,
    interval_nanos: u64,
}

impl ProgressThrottler {
    pub fn new(interval: Duration) -> Self {
        Self {
            origin: Instant::now(),
            last_emit_nanos: AtomicU64::new(u64::MAX),
            interval_nanos: interval.as_nanos().min(u64::MAX as u128) as u64,
        }
    }

    pub fn with_millis(interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(interval_ms))
    }

    /// Returns true (and records the emission) when the interval has elapsed.
    /// The first call always emits.
    pub fn should_emit(&self) -> bool {
        let now = self.now_nanos();
        let last = self.last_emit_nanos.load(Ordering::Relaxed);

        if last != u64::MAX && now.saturating_sub(last) < self.interval_nanos {
            return false;
        }

        self.last_emit_nanos
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    pub fn reset(&self) {
        self.last_emit_nanos.store(u64::MAX, Ordering::Relaxed);
    }

    fn now_nanos(&self) -> u64 {
        (self.origin.elapsed().as_nanos() as u64).min(u64::MAX - 1)
    }
}

impl Default for ProgressThrottler {
    fn default() -> Self {
        Self::with_millis(DEFAULT_THROTTLE_INTERVAL_MS)
    }
}
