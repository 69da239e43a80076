//! Scripted transports for unit tests: replay reads, capture writes, drive a ManualClock.

use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;

use crate::receiver::transport::Connector;
use crate::utils::clock::ManualClock;

#[derive(Debug, Clone)]
pub enum ReadStep {
    Data(Vec<u8>),
    /// No bytes available: advances the clock and reports a read timeout.
    Idle,
    Eof,
    Fail(io::ErrorKind),
}

pub struct ScriptedStream {
    reads: VecDeque<ReadStep>,
    written: Arc<Mutex<Vec<u8>>>,
    clock: ManualClock,
    idle_advance: Duration,
}

impl ScriptedStream {
    pub fn new(clock: &ManualClock, steps: Vec<ReadStep>) -> Self {
        Self {
            reads: steps.into(),
            written: Arc::new(Mutex::new(Vec::new())),
            clock: clock.clone(),
            idle_advance: Duration::from_secs(1),
        }
    }

    pub fn data(bytes: impl AsRef<[u8]>) -> ReadStep {
        ReadStep::Data(bytes.as_ref().to_vec())
    }

    /// Script steps not yet consumed by a read.
    pub fn remaining_reads(&self) -> usize {
        self.reads.len()
    }

    /// Shared view of everything written to this stream.
    pub fn written(&self) -> Arc<Mutex<Vec<u8>>> {
        self.written.clone()
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // An exhausted script behaves like a silent peer.
        match self.reads.pop_front().unwrap_or(ReadStep::Idle) {
            ReadStep::Data(mut bytes) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    self.reads.push_front(ReadStep::Data(bytes.split_off(n)));
                }
                Ok(n)
            }
            ReadStep::Idle => {
                self.clock.advance(self.idle_advance);
                Err(io::ErrorKind::WouldBlock.into())
            }
            ReadStep::Eof => Ok(0),
            ReadStep::Fail(kind) => Err(kind.into()),
        }
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Hands out pre-built streams; refuses once they run out.
pub struct ScriptedConnector {
    streams: VecDeque<io::Result<ScriptedStream>>,
    pub connects: Arc<Mutex<u32>>,
}

impl ScriptedConnector {
    pub fn new(streams: Vec<io::Result<ScriptedStream>>) -> Self {
        Self {
            streams: streams.into(),
            connects: Arc::new(Mutex::new(0)),
        }
    }
}

impl Connector for ScriptedConnector {
    type Stream = ScriptedStream;

    fn connect(&mut self) -> io::Result<ScriptedStream> {
        *self.connects.lock() += 1;
        self.streams
            .pop_front()
            .unwrap_or_else(|| Err(io::ErrorKind::ConnectionRefused.into()))
    }

    fn describe(&self) -> String {
        "scripted producer".into()
    }
}
