//! handshake.rs
//! Line-based readiness exchange run once per connection before any framed data.
//! - waits for the producer's `PYTHON_READY` line (tolerates prefixes, CR and unrelated chatter)
//! - answers with `UNITY_READY\n`
//! - optionally waits for `START_TRANSMISSION`
//! - bytes received after the last sentinel line are handed back to seed the frame decoder
//! - a line longer than `max_line_bytes` fails the attempt (a peer streaming frames before
//!   the handshake never sends a newline)

use std::{
    io::{self, Read, Write},
    thread,
    time::Duration,
};

use log::{debug, info, warn};

use crate::error::ReceiverError;
use crate::utils::{clock::Clock, poll::is_poll_timeout, shutdown::ShutdownToken};

pub const PRODUCER_READY: &str = "PYTHON_READY";
pub const CONSUMER_READY: &str = "UNITY_READY";
pub const START_TRANSMISSION: &str = "START_TRANSMISSION";

/// Upper bound for one handshake line, sentinel plus any trailing text.
pub const DEFAULT_MAX_LINE_BYTES: usize = 4096;

const READ_CHUNK: usize = 1024;
const IDLE_SLEEP: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeConfig {
    pub ready_timeout: Duration,
    pub start_timeout: Duration,
    pub await_start_transmission: bool,
    pub max_line_bytes: usize,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(30),
            start_timeout: Duration::from_secs(10),
            await_start_transmission: false,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeStep {
    WaitReady,
    SendReady,
    WaitStart,
    Done,
}

pub struct Handshake<'a, S, K: ?Sized> {
    stream: &'a mut S,
    clock: &'a K,
    shutdown: &'a ShutdownToken,
    config: &'a HandshakeConfig,
    pending: Vec<u8>,
    /// Prefix of `pending` already searched for a newline.
    scanned: usize,
}

impl<'a, S, K> Handshake<'a, S, K>
where
    S: Read + Write,
    K: Clock + ?Sized,
{
    pub fn new(
        stream: &'a mut S,
        clock: &'a K,
        shutdown: &'a ShutdownToken,
        config: &'a HandshakeConfig,
    ) -> Self {
        Self {
            stream,
            clock,
            shutdown,
            config,
            pending: Vec::with_capacity(READ_CHUNK),
            scanned: 0,
        }
    }

    /// Runs the exchange to completion.
    /// Returns whatever arrived after the final sentinel line; it belongs to the framed stream.
    pub fn run(mut self) -> Result<Vec<u8>, ReceiverError> {
        let mut step = HandshakeStep::WaitReady;
        loop {
            step = match step {
                HandshakeStep::WaitReady => {
                    self.wait_for(PRODUCER_READY, self.config.ready_timeout)?;
                    debug!("[Handshake] received {}", PRODUCER_READY);
                    HandshakeStep::SendReady
                }
                HandshakeStep::SendReady => {
                    self.stream.write_all(CONSUMER_READY.as_bytes())?;
                    self.stream.write_all(b"\n")?;
                    self.stream.flush()?;
                    debug!("[Handshake] sent {}", CONSUMER_READY);
                    if self.config.await_start_transmission {
                        HandshakeStep::WaitStart
                    } else {
                        HandshakeStep::Done
                    }
                }
                HandshakeStep::WaitStart => {
                    self.wait_for(START_TRANSMISSION, self.config.start_timeout)?;
                    debug!("[Handshake] received {}", START_TRANSMISSION);
                    HandshakeStep::Done
                }
                HandshakeStep::Done => break,
            };
        }

        // Blank lines after the last sentinel are not part of the framed stream.
        let blank = self
            .pending
            .iter()
            .take_while(|&&b| b == b'\r' || b == b'\n')
            .count();
        self.pending.drain(..blank);

        if !self.pending.is_empty() {
            info!(
                "[Handshake] complete, {} byte(s) of stream data arrived early",
                self.pending.len()
            );
        }
        Ok(self.pending)
    }

    /// Consumes lines until one starts with `sentinel` after trimming. Always a prefix match:
    /// an exact `sentinel` line matches too, and producers that append a version or other
    /// text after the sentinel are accepted.
    fn wait_for(&mut self, sentinel: &'static str, timeout: Duration) -> Result<(), ReceiverError> {
        let deadline = self.clock.now() + timeout;
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if self.take_matching_line(sentinel) {
                return Ok(());
            }
            if self.pending.len() > self.config.max_line_bytes {
                return Err(ReceiverError::HandshakeLineTooLong {
                    expected: sentinel,
                    limit: self.config.max_line_bytes,
                });
            }
            if self.shutdown.is_triggered() {
                return Err(ReceiverError::Shutdown);
            }
            if self.clock.now() >= deadline {
                return Err(ReceiverError::HandshakeTimeout {
                    expected: sentinel,
                    timeout,
                });
            }

            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(ReceiverError::PeerClosed),
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e) if is_poll_timeout(&e) => thread::sleep(IDLE_SLEEP),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Pops complete lines from `pending`. Stops after the first sentinel match,
    /// leaving the remainder in place.
    fn take_matching_line(&mut self, sentinel: &str) -> bool {
        while let Some(offset) = self.pending[self.scanned..].iter().position(|&b| b == b'\n') {
            let pos = self.scanned + offset;
            self.scanned = 0;
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line);
            let text = text.trim();
            if text.starts_with(sentinel) {
                return true;
            }
            if !text.is_empty() {
                warn!("[Handshake] ignoring unexpected line while waiting for {}: {:?}", sentinel, text);
            }
        }
        self.scanned = self.pending.len();
        false
    }
}
