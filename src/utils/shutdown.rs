//! Cooperative cancellation shared by the retry loop, the handshake and the receive loop.
//!
//! - `trigger()` flips an atomic flag and drops the wake channel's sender,
//!   so every `wait_timeout` in progress returns immediately.
//! - Idempotent: triggering twice is a no-op.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;

#[derive(Clone, Debug)]
pub struct ShutdownToken {
    triggered: Arc<AtomicBool>,
    wake_tx: Arc<Mutex<Option<Sender<()>>>>,
    wake_rx: Receiver<()>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            triggered: Arc::new(AtomicBool::new(false)),
            wake_tx: Arc::new(Mutex::new(Some(tx))),
            wake_rx: rx,
        }
    }

    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::Release);
        // Disconnecting the channel wakes all sleepers.
        self.wake_tx.lock().take();
    }

    #[inline]
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Sleeps up to `timeout`. Returns `true` if shutdown was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_triggered() {
            return true;
        }
        match self.wake_rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => self.is_triggered(),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        }
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}
