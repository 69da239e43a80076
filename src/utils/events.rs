//! Receiver event trace: lock-free recording + background CSV export.
//!
//! - **record():** pushes onto a bounded ArrayQueue and returns immediately (drops if full).
//! - **start_exporter():** spawns a thread draining the queue into a CSV file, batching flushes.
//!
//! Traces connection lifecycle (attempt → connected → handshake → streaming → lost)
//! and per-message outcomes (published, decode failure, framing reset).

use std::{
    fs::OpenOptions,
    io::{self, BufWriter},
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_queue::ArrayQueue;
use csv::WriterBuilder;
use log::{debug, error};
use serde::Serialize;

const EVENT_QUEUE_CAPACITY: usize = 16_384;
const EXPORT_POLL_MS: u64 = 5;
const FLUSH_BATCHES: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub enum ReceiverEvent {
    AttemptStarted { attempt: u32 },
    Connected { attempt: u32 },
    HandshakeComplete { elapsed_us: u64, leftover_bytes: usize },
    SamplePublished { seq: u64, payload_len: usize, has_frame: bool },
    DecodeFailed { payload_len: usize },
    FramingReset { field: String },
    ConnectionLost { reason: String },
    Stopped,
}

impl ReceiverEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ReceiverEvent::AttemptStarted { .. } => "attempt_started",
            ReceiverEvent::Connected { .. } => "connected",
            ReceiverEvent::HandshakeComplete { .. } => "handshake_complete",
            ReceiverEvent::SamplePublished { .. } => "sample_published",
            ReceiverEvent::DecodeFailed { .. } => "decode_failed",
            ReceiverEvent::FramingReset { .. } => "framing_reset",
            ReceiverEvent::ConnectionLost { .. } => "connection_lost",
            ReceiverEvent::Stopped => "stopped",
        }
    }

    fn detail(&self) -> String {
        match self {
            ReceiverEvent::AttemptStarted { attempt } | ReceiverEvent::Connected { attempt } => {
                format!("attempt={}", attempt)
            }
            ReceiverEvent::HandshakeComplete { elapsed_us, leftover_bytes } => {
                format!("elapsed_us={} leftover={}", elapsed_us, leftover_bytes)
            }
            ReceiverEvent::SamplePublished { seq, payload_len, has_frame } => {
                format!("seq={} bytes={} frame={}", seq, payload_len, has_frame)
            }
            ReceiverEvent::DecodeFailed { payload_len } => format!("bytes={}", payload_len),
            ReceiverEvent::FramingReset { field } => format!("field={:?}", field),
            ReceiverEvent::ConnectionLost { reason } => reason.clone(),
            ReceiverEvent::Stopped => String::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct EventRow<'a> {
    ts_ns: u64,
    event: &'a str,
    detail: String,
}

/// Non-blocking event recorder.
/// Timestamps are nanoseconds since the recorder was created.
#[derive(Clone)]
pub struct EventRecorder {
    queue: Arc<ArrayQueue<(u64, ReceiverEvent)>>,
    run_start: Instant,
    dropped: Arc<AtomicU64>,
    exporting: Arc<AtomicBool>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(EVENT_QUEUE_CAPACITY)),
            run_start: Instant::now(),
            dropped: Arc::new(AtomicU64::new(0)),
            exporting: Arc::new(AtomicBool::new(false)),
        }
    }

    #[inline]
    pub fn record(&self, event: ReceiverEvent) {
        if self.queue.push((self.now_ns(), event)).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn now_ns(&self) -> u64 {
        self.run_start.elapsed().as_nanos() as u64
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Spawns the CSV exporter. Appends to `output_csv`; the header is written only for a new file.
    /// Runs until `stop_exporter()`, then drains what is left.
    pub fn start_exporter(&self, output_csv: PathBuf) -> io::Result<JoinHandle<()>> {
        let file = OpenOptions::new().create(true).append(true).open(&output_csv)?;
        let write_header = file.metadata()?.len() == 0;

        let queue = self.queue.clone();
        let exporting = self.exporting.clone();
        let dropped = self.dropped.clone();
        exporting.store(true, Ordering::SeqCst);

        thread::Builder::new()
            .name("event-exporter".into())
            .spawn(move || {
                let mut wtr = WriterBuilder::new()
                    .has_headers(write_header)
                    .from_writer(BufWriter::new(file));
                let mut batches = 0usize;

                while exporting.load(Ordering::SeqCst) {
                    if write_pending(&queue, &mut wtr) {
                        batches += 1;
                        if batches >= FLUSH_BATCHES {
                            wtr.flush().ok();
                            batches = 0;
                        }
                    } else {
                        thread::sleep(Duration::from_millis(EXPORT_POLL_MS));
                    }
                }

                // Final drain
                write_pending(&queue, &mut wtr);
                wtr.flush().ok();
                debug!(
                    "[EventRecorder] exporter exiting. dropped_events={}",
                    dropped.load(Ordering::Relaxed)
                );
            })
    }

    pub fn stop_exporter(&self) {
        self.exporting.store(false, Ordering::SeqCst);
    }
}

/// Writes every queued event. Returns `true` if anything was written.
fn write_pending<W: io::Write>(
    queue: &ArrayQueue<(u64, ReceiverEvent)>,
    wtr: &mut csv::Writer<W>,
) -> bool {
    let mut any = false;
    while let Some((ts_ns, event)) = queue.pop() {
        any = true;
        let row = EventRow {
            ts_ns,
            event: event.name(),
            detail: event.detail(),
        };
        if let Err(e) = wtr.serialize(&row) {
            error!("[EventRecorder] failed to write event row: {}", e);
        }
    }
    any
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}
