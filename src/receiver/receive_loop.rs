//! receive_loop.rs
//! Streaming phase of one connection: socket bytes → FrameDecoder → MessageCodec → mailbox.
//! - owns the stream and the byte buffer exclusively; only the mailbox and status are shared
//! - a corrupt length prefix resets the buffer and keeps the connection
//! - a payload that fails to decode is dropped; the loop keeps going
//! - returns on EOF, read error, oversized frame or shutdown

use std::{
    io::{self, Read},
    sync::Arc,
    thread,
    time::Duration,
};

use log::{error, trace, warn};

use crate::config::ReceiverConfig;
use crate::error::{FramingError, ReceiverError};
use crate::protocol::{codec::MessageCodec, framing::FrameDecoder};
use crate::receiver::{mailbox::LatestSamplePublisher, status::SharedStatus};
use crate::utils::{
    events::{EventRecorder, ReceiverEvent},
    poll::is_poll_timeout,
    shutdown::ShutdownToken,
};

const IDLE_YIELD: Duration = Duration::from_millis(1);

pub struct ReceiveLoop<S> {
    stream: S,
    decoder: FrameDecoder,
    codec: MessageCodec,
    mailbox: Arc<LatestSamplePublisher>,
    status: Arc<SharedStatus>,
    shutdown: ShutdownToken,
    recorder: Option<Arc<EventRecorder>>,
    chunk: Vec<u8>,
}

impl<S: Read> ReceiveLoop<S> {
    pub fn new(
        stream: S,
        config: &ReceiverConfig,
        mailbox: Arc<LatestSamplePublisher>,
        status: Arc<SharedStatus>,
        shutdown: ShutdownToken,
    ) -> Self {
        Self {
            stream,
            decoder: FrameDecoder::with_max_frame_len(config.max_frame_bytes),
            codec: MessageCodec::new(config.role),
            mailbox,
            status,
            shutdown,
            recorder: None,
            chunk: vec![0u8; config.read_chunk_bytes],
        }
    }

    pub fn with_recorder(mut self, recorder: Option<Arc<EventRecorder>>) -> Self {
        self.recorder = recorder;
        self
    }

    /// Feeds bytes that arrived together with the handshake.
    pub fn seed(&mut self, leftover: &[u8]) {
        self.decoder.push(leftover);
    }

    /// Runs until the stream ends. `Ok(())` only when shutdown was requested.
    pub fn run(mut self) -> Result<(), ReceiverError> {
        // Leftover bytes may already hold complete frames.
        self.drain_frames()?;

        loop {
            if self.shutdown.is_triggered() {
                return Ok(());
            }

            match self.stream.read(&mut self.chunk) {
                Ok(0) => return Err(ReceiverError::PeerClosed),
                Ok(n) => {
                    trace!("[ReceiveLoop] read {} bytes", n);
                    self.decoder.push(&self.chunk[..n]);
                    self.drain_frames()?;
                }
                Err(e) if is_poll_timeout(&e) => thread::sleep(IDLE_YIELD),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn drain_frames(&mut self) -> Result<(), ReceiverError> {
        loop {
            match self.decoder.next_frame() {
                Ok(Some(payload)) => self.handle_payload(&payload),
                Ok(None) => return Ok(()),
                Err(FramingError::InvalidLength { field }) => {
                    error!(
                        "[ReceiveLoop] invalid length field {:?}; discarded buffered bytes",
                        field
                    );
                    self.status.record_framing_reset();
                    self.record(ReceiverEvent::FramingReset { field });
                }
                Err(e @ FramingError::FrameTooLarge { .. }) => return Err(e.into()),
            }
        }
    }

    fn handle_payload(&self, payload: &[u8]) {
        match self.codec.decode(payload) {
            Ok(sample) => {
                let has_frame = sample.frame().is_some();
                let seq = self.mailbox.publish(sample);
                trace!("[ReceiveLoop] published sample #{} ({} bytes)", seq, payload.len());
                self.record(ReceiverEvent::SamplePublished {
                    seq,
                    payload_len: payload.len(),
                    has_frame,
                });
            }
            Err(e) => {
                warn!("[ReceiveLoop] dropping {}-byte message: {}", payload.len(), e);
                self.status.record_decode_error();
                self.record(ReceiverEvent::DecodeFailed {
                    payload_len: payload.len(),
                });
            }
        }
    }

    #[inline]
    fn record(&self, event: ReceiverEvent) {
        if let Some(recorder) = &self.recorder {
            recorder.record(event);
        }
    }
}
