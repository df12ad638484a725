//! Transport error types.

use std::time::Duration;
use thiserror::Error;

/// Transport operation errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("flood wait: retry after {0:?}")]
    FloodWait(Duration),

    #[error("connection lost: {0}")]
    Disconnected(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("reconnect gave up after {elapsed:?}: {last}")]
    ReconnectExhausted {
        elapsed: Duration,
        last: Box<TransportError>,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unexpected reply to {call}: {reply}")]
    UnexpectedReply {
        call: &'static str,
        reply: &'static str,
    },

    #[error("size mismatch: declared {expected} bytes, stream yielded {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("connection closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl TransportError {
    /// Connection-level failure that a fresh connection may cure.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnected(_))
    }

    /// Failures the retry ceiling may repeat after its fixed delay.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Disconnected(_) | Self::Timeout(_) => true,
            Self::Rpc { code, .. } => *code >= 500,
            _ => false,
        }
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FloodWait(_) => "flood_wait",
            Self::Disconnected(_) => "disconnected",
            Self::Timeout(_) => "timeout",
            Self::Auth(_) => "auth",
            Self::Rpc { .. } => "rpc",
            Self::ReconnectExhausted { .. } => "reconnect_exhausted",
            Self::InvalidRequest(_) => "invalid_request",
            Self::UnexpectedReply { .. } => "unexpected_reply",
            Self::SizeMismatch { .. } => "size_mismatch",
            Self::Closed => "closed",
            Self::Io(_) => "io",
            Self::Config(_) => "config",
        }
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;
