//! Encryption error types.

use thiserror::Error;

/// Encryption operation errors.
#[derive(Debug, Error)]
pub enum CryptError {
    #[error("encryption key is empty")]
    EmptyKey,

    #[error("salt is empty")]
    EmptySalt,

    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed at block {0}")]
    DecryptFailed(u64),

    #[error("invalid ciphertext header: {0}")]
    InvalidHeader(String),

    #[error("truncated ciphertext: {0}")]
    Truncated(String),
}

impl From<CryptError> for std::io::Error {
    fn from(e: CryptError) -> Self {
        std::io::Error::new(std::io::ErrorKind::InvalidData, e)
    }
}

/// Result type for encryption operations.
pub type CryptResult<T> = std::result::Result<T, CryptError>;
