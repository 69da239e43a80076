//! # Tracking Receiver
//! Receives head/hand tracking telemetry from an external vision process over TCP
//! and hands the freshest sample to a fixed-rate consumer loop.
//!
//! ## Pipeline
//! ConnectionManager → Handshake → ReceiveLoop → FrameDecoder → MessageCodec → mailbox → consumer tick.
//!
//! ## Concurrency
//! - One background thread per receiver owns the socket and the byte buffer.
//! - The consumer polls a single-slot, last-value-wins mailbox; neither side blocks the other.
//! - Shutdown is cooperative: a cancellation token plus a socket read deadline.
//!
//! ## Wire format
//! - Handshake lines: `PYTHON_READY\n` → `UNITY_READY\n` → optional `START_TRANSMISSION\n`.
//! - Then `<decimal length>:<payload>` frames, payload = UTF-8 JSON.

pub mod config;
pub mod consumer;
pub mod error;
pub mod protocol;
pub mod receiver;
pub mod utils;

pub use config::ReceiverConfig;
pub use consumer::{FrameSink, PositionSink, TickDispatcher, TickReport, Viewport};
pub use error::{ConfigError, DecodeError, FramingError, ReceiverError};
pub use protocol::{
    FrameDecoder, MessageCodec, NormalizedPoint, Role, TelemetrySample, TrackedPoint,
    codec::{HandsSample, HeadSample},
    encode_frame,
};
pub use receiver::{
    TrackingReceiver,
    mailbox::LatestSamplePublisher,
    status::{ConnectionState, StatusSnapshot},
};
