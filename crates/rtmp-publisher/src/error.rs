//! Error types for the publisher API.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

// ── Errors ──────────────────────────────────────────────────────────

/// A media descriptor that cannot be turned into sequence headers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("AudioSpecificConfig must be at least 2 bytes, got {0}")]
    AscTooShort(usize),
    #[error("SPS must be at least 4 bytes to carry profile and level, got {0}")]
    SpsTooShort(usize),
    #[error("{kind} is {len} bytes, exceeds the 16-bit length field")]
    ParameterSetTooLong { kind: &'static str, len: usize },
    #[error("invalid publisher config: {0}")]
    Invalid(String),
}

/// Status reported by every fallible publisher operation.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("invalid RTMP url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: &'static str },
    #[error("connect to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: SocketAddr, timeout: Duration },
    #[error("connect to {target} failed: {source}")]
    ConnectFailed {
        target: String,
        #[source]
        source: io::Error,
    },
    #[error("no open session")]
    NotConnected,
    #[error("frame of {len} bytes is too short (minimum {min})")]
    TooShort { len: usize, min: usize },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("event loop unavailable: {0}")]
    EventLoop(anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PublishError>;
