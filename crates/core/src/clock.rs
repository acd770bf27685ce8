//! Injectable time source.
//!
//! Every component that reads the wall clock or sleeps does so through
//! [`Clock`], so pacing and backoff behaviour can be tested without real
//! waits. Production code uses [`SystemClock`]; tests use [`ManualClock`].

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Time source abstraction.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Block the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall-clock implementation backed by the OS.
#[derive(Debug, Default, Copy, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Deterministic clock for tests.
///
/// `sleep` never blocks: it records the requested duration and advances the
/// internal instant by it, so backoff sequences can be asserted exactly.
#[derive(Debug)]
pub struct ManualClock {
    inner: Mutex<ManualState>,
}

#[derive(Debug)]
struct ManualState {
    now: DateTime<Utc>,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            inner: Mutex::new(ManualState {
                now,
                sleeps: Vec::new(),
            }),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut state = self.inner.lock().unwrap();
        state.now += chrono::Duration::from_std(by).unwrap_or_default();
    }

    /// Set the clock to an absolute instant.
    pub fn set(&self, now: DateTime<Utc>) {
        self.inner.lock().unwrap().now = now;
    }

    /// All durations passed to `sleep`, in call order.
    pub fn recorded_sleeps(&self) -> Vec<Duration> {
        self.inner.lock().unwrap().sleeps.clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.inner.lock().unwrap().now
    }

    fn sleep(&self, duration: Duration) {
        let mut state = self.inner.lock().unwrap();
        state.sleeps.push(duration);
        state.now += chrono::Duration::from_std(duration).unwrap_or_default();
    }
}
