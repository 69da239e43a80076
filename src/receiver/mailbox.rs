//! mailbox.rs
//! Single-slot, last-value-wins hand-off between the receive loop (writer) and the consumer tick (reader).
//! - `publish()` never blocks on the reader and always replaces an unread sample
//! - `take()` moves the sample out and clears the dirty flag; `None` means nothing new since the last take
//! - the lock is held only for a swap, so neither side waits on the other's work

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

use parking_lot::Mutex;

use crate::protocol::codec::TelemetrySample;

#[derive(Debug, Default)]
struct Slot {
    sample: Option<TelemetrySample>,
    last_write: Option<Instant>,
}

#[derive(Debug, Default)]
pub struct LatestSamplePublisher {
    slot: Mutex<Slot>,
    sequence: AtomicU64,
    overwritten: AtomicU64,
}

impl LatestSamplePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `sample`, replacing any value the consumer has not taken yet.
    /// Returns the sequence number assigned to it (1-based).
    pub fn publish(&self, sample: TelemetrySample) -> u64 {
        let mut slot = self.slot.lock();
        if slot.sample.is_some() {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
        slot.sample = Some(sample);
        slot.last_write = Some(Instant::now());
        self.sequence.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn take(&self) -> Option<TelemetrySample> {
        self.slot.lock().sample.take()
    }

    pub fn has_new(&self) -> bool {
        self.slot.lock().sample.is_some()
    }

    pub fn last_write(&self) -> Option<Instant> {
        self.slot.lock().last_write
    }

    /// Sequence number of the most recent publish; 0 before the first one.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    pub fn published(&self) -> u64 {
        self.sequence()
    }

    pub fn overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }

    /// Drops any unread sample (and its frame bytes).
    pub fn clear(&self) {
        self.slot.lock().sample = None;
    }
}
