//! Time source for the exchanger
//!
//! Deadlines and pauses go through [`Clock`] so the polling loop can
//! run against wall-clock time in production and against a manually
//! advanced clock in tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time plus a way to wait
pub trait Clock {
    /// Current instant
    fn now(&self) -> Instant;

    /// Block the caller for `duration`
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::time::Instant`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Clock that only moves when told to
///
/// Every call to [`now`](Clock::now) advances time by `tick`, which
/// keeps busy-polling loops finite. [`sleep`](Clock::sleep) advances
/// time without blocking. Clones share the same time line.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    elapsed_nanos: Arc<AtomicU64>,
    tick_nanos: u64,
}

impl ManualClock {
    /// Clock that advances by `tick` per reading
    pub fn new(tick: Duration) -> Self {
        Self {
            base: Instant::now(),
            elapsed_nanos: Arc::new(AtomicU64::new(0)),
            tick_nanos: tick.as_nanos() as u64,
        }
    }

    /// Move time forward
    pub fn advance(&self, duration: Duration) {
        self.elapsed_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Time elapsed since the clock was created
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_nanos.load(Ordering::SeqCst))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let nanos = self
            .elapsed_nanos
            .fetch_add(self.tick_nanos, Ordering::SeqCst)
            + self.tick_nanos;
        self.base + Duration::from_nanos(nanos)
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
