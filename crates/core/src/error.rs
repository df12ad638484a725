//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid upload id: {0}")]
    InvalidUploadId(String),

    #[error("invalid part number: {0} (must be >= 1)")]
    InvalidPartNo(i64),

    #[error("invalid part name: {0}")]
    InvalidPartName(String),

    #[error("invalid part size: {size} (must be between 1 and {max})")]
    InvalidPartSize { size: u64, max: u64 },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
