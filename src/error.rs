//! Error types for the tracking receiver.
//!
//! - **ReceiverError:** connection lifecycle failures; every variant is folded into the retry loop.
//! - **FramingError:** wire-level corruption detected by the FrameDecoder.
//! - **DecodeError:** a single payload that could not be turned into a sample (message dropped).
//! - **ConfigError:** invalid or unreadable configuration.

use std::{io, time::Duration};
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, ReceiverError>;

#[derive(Debug, Error)]
pub enum ReceiverError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Timed out after {timeout:?} waiting for '{expected}'")]
    HandshakeTimeout {
        expected: &'static str,
        timeout: Duration,
    },

    #[error("Handshake line exceeded {limit} bytes while waiting for '{expected}'")]
    HandshakeLineTooLong { expected: &'static str, limit: usize },

    #[error("Connection closed by producer")]
    PeerClosed,

    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("Gave up after {attempts} consecutive failed attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Shutdown requested")]
    Shutdown,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// Length prefix is not a non-negative decimal integer. The buffer is discarded.
    #[error("Invalid length field {field:?}")]
    InvalidLength { field: String },

    /// Declared payload exceeds the configured maximum. The connection is dropped.
    #[error("Declared frame length {declared} exceeds maximum {max}")]
    FrameTooLarge { declared: usize, max: usize },
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
