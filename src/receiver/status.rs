//! Connection state and counters shared between the worker thread and the consumer.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use parking_lot::RwLock;

use crate::error::ReceiverError;
use crate::receiver::mailbox::LatestSamplePublisher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    AwaitingHandshake,
    Streaming,
    Failed,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (_, Failed) | (_, Disconnected) => true,
            (Disconnected, Connecting) | (Failed, Connecting) => true,
            (Connecting, AwaitingHandshake) => true,
            (AwaitingHandshake, Streaming) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::AwaitingHandshake => "awaiting_handshake",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default)]
struct Lifecycle {
    state: ConnectionState,
    last_error: Option<String>,
    attempts: u32,
}

#[derive(Debug, Default)]
pub struct SharedStatus {
    lifecycle: RwLock<Lifecycle>,
    decode_errors: AtomicU64,
    framing_resets: AtomicU64,
}

impl SharedStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        self.lifecycle.read().state
    }

    /// Applies `next` if the lifecycle allows it. Returns whether the state changed.
    pub fn transition(&self, next: ConnectionState) -> bool {
        let mut lc = self.lifecycle.write();
        if lc.state.can_transition_to(next) {
            lc.state = next;
            true
        } else {
            false
        }
    }

    /// Moves to `Connecting` and returns the attempt number (1-based, never reset).
    pub fn begin_attempt(&self) -> u32 {
        let mut lc = self.lifecycle.write();
        lc.state = ConnectionState::Connecting;
        lc.attempts += 1;
        lc.attempts
    }

    pub fn record_failure(&self, err: &ReceiverError) {
        let mut lc = self.lifecycle.write();
        lc.state = ConnectionState::Failed;
        lc.last_error = Some(err.to_string());
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_framing_reset(&self) {
        self.framing_resets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, mailbox: &LatestSamplePublisher) -> StatusSnapshot {
        let lc = self.lifecycle.read();
        StatusSnapshot {
            state: lc.state,
            last_error: lc.last_error.clone(),
            attempts: lc.attempts,
            samples_published: mailbox.published(),
            samples_overwritten: mailbox.overwritten(),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            framing_resets: self.framing_resets.load(Ordering::Relaxed),
            last_sample_age: mailbox.last_write().map(|t| t.elapsed()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub state: ConnectionState,
    pub last_error: Option<String>,
    pub attempts: u32,
    pub samples_published: u64,
    /// Samples replaced before the consumer took them.
    pub samples_overwritten: u64,
    pub decode_errors: u64,
    pub framing_resets: u64,
    pub last_sample_age: Option<Duration>,
}
