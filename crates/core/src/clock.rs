// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction so time-dependent logic stays testable.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Source of monotonic and wall-clock time.
///
/// Monotonic `now()` drives breaker windows and timers; `epoch_ms()` is the
/// wall-clock value written to records and the store.
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;
    fn epoch_ms(&self) -> u64;
}

/// Real system clock.
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

#[derive(Debug)]
struct FakeTime {
    elapsed: Duration,
    epoch_ms: u64,
}

/// Controllable clock for tests. `advance` moves both the monotonic and the
/// wall-clock reading by the same amount.
#[derive(Clone)]
pub struct FakeClock {
    start: Instant,
    time: Arc<Mutex<FakeTime>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            time: Arc::new(Mutex::new(FakeTime {
                elapsed: Duration::ZERO,
                epoch_ms: 1_000_000,
            })),
        }
    }

    /// A fake clock whose wall clock starts at the given epoch milliseconds.
    pub fn at_epoch_ms(epoch_ms: u64) -> Self {
        let clock = Self::new();
        clock.time.lock().epoch_ms = epoch_ms;
        clock
    }

    /// Advance both time sources by `duration`.
    pub fn advance(&self, duration: Duration) {
        let mut time = self.time.lock();
        time.elapsed += duration;
        time.epoch_ms += duration.as_millis() as u64;
    }

    /// Pin the wall clock to a specific epoch milliseconds value.
    pub fn set_epoch_ms(&self, epoch_ms: u64) {
        self.time.lock().epoch_ms = epoch_ms;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.start + self.time.lock().elapsed
    }

    fn epoch_ms(&self) -> u64 {
        self.time.lock().epoch_ms
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
