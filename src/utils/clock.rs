//! Time source for deadlines and backoff waits.
//!
//! `SystemClock` is used in production. `ManualClock` only moves when told to,
//! so 30 s handshake timeouts and retry backoffs can be exercised instantly.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::utils::shutdown::ShutdownToken;

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Waits for `duration` unless shutdown is requested first.
    /// Returns `true` if the full wait elapsed.
    fn wait(&self, duration: Duration, shutdown: &ShutdownToken) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wait(&self, duration: Duration, shutdown: &ShutdownToken) -> bool {
        !shutdown.wait_timeout(duration)
    }
}

/// Fast-forwarded clock: `wait` returns at once after advancing virtual time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
    waits: Arc<Mutex<Vec<Duration>>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
            waits: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }

    /// Virtual time elapsed since creation.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }

    /// Every duration passed to `wait`, in call order.
    pub fn recorded_waits(&self) -> Vec<Duration> {
        self.waits.lock().clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock()
    }

    fn wait(&self, duration: Duration, shutdown: &ShutdownToken) -> bool {
        self.waits.lock().push(duration);
        self.advance(duration);
        !shutdown.is_triggered()
    }
}
