//! Receiver configuration.
//!
//! Defaults match the producer's shipped settings (loopback, port 12345, 30 s ready wait,
//! fixed 2 s retry). Loadable from JSON; every field is optional in the file.

use std::{fs, path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::protocol::{
    codec::Role,
    handshake::{DEFAULT_MAX_LINE_BYTES, HandshakeConfig},
};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 12345;
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_START_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 2_000;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;
pub const DEFAULT_READ_POLL_MS: u64 = 50;
pub const DEFAULT_READ_CHUNK_BYTES: usize = 1024 * 1024;
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    pub host: String,
    pub port: u16,
    pub role: Role,
    /// Wait for `START_TRANSMISSION` after sending our ready line.
    pub await_start_transmission: bool,
    pub ready_timeout_ms: u64,
    pub start_timeout_ms: u64,
    /// Longest handshake line accepted before the attempt fails.
    pub max_handshake_line_bytes: usize,
    pub connect_timeout_ms: u64,
    pub retry_backoff_ms: u64,
    /// 1.0 keeps the backoff fixed; above 1.0 grows it per consecutive failure.
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Restart the connect cycle when an established stream is lost.
    pub reconnect_on_loss: bool,
    /// Socket read deadline; bounds how long shutdown waits on a blocked read.
    pub read_poll_ms: u64,
    pub read_chunk_bytes: usize,
    pub max_frame_bytes: usize,
    /// CSV event trace destination.
    pub event_log: Option<PathBuf>,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            role: Role::Head,
            await_start_transmission: false,
            ready_timeout_ms: DEFAULT_READY_TIMEOUT_MS,
            start_timeout_ms: DEFAULT_START_TIMEOUT_MS,
            max_handshake_line_bytes: DEFAULT_MAX_LINE_BYTES,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            backoff_multiplier: 1.0,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            max_attempts: None,
            reconnect_on_loss: true,
            read_poll_ms: DEFAULT_READ_POLL_MS,
            read_chunk_bytes: DEFAULT_READ_CHUNK_BYTES,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            event_log: None,
        }
    }
}

impl ReceiverConfig {
    pub fn for_role(role: Role) -> Self {
        Self {
            role,
            ..Self::default()
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".into()));
        }
        if self.read_chunk_bytes == 0 {
            return Err(ConfigError::Invalid("read_chunk_bytes must be non-zero".into()));
        }
        if self.read_poll_ms == 0 {
            return Err(ConfigError::Invalid("read_poll_ms must be non-zero".into()));
        }
        if self.max_frame_bytes == 0 {
            return Err(ConfigError::Invalid("max_frame_bytes must be non-zero".into()));
        }
        if self.max_handshake_line_bytes == 0 {
            return Err(ConfigError::Invalid("max_handshake_line_bytes must be non-zero".into()));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "backoff_multiplier must be finite and >= 1.0 (got {})",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn handshake(&self) -> HandshakeConfig {
        HandshakeConfig {
            ready_timeout: Duration::from_millis(self.ready_timeout_ms),
            start_timeout: Duration::from_millis(self.start_timeout_ms),
            await_start_transmission: self.await_start_transmission,
            max_line_bytes: self.max_handshake_line_bytes,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn read_poll(&self) -> Duration {
        Duration::from_millis(self.read_poll_ms)
    }
}
