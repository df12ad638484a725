//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ferry_metadata::MetadataError;
use ferry_transport::TransportError;
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("encryption requested but no encryption key is configured")]
    EncryptionKeyMissing,

    /// The remote accepted the send but the part could not be confirmed.
    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("core error: {0}")]
    Core(#[from] ferry_core::Error),

    #[error("encryption error: {0}")]
    Crypt(#[from] ferry_crypt::CryptError),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Conflict(_) => "conflict",
            Self::EncryptionKeyMissing => "encryption_key_missing",
            Self::UploadFailed(_) => "upload_failed",
            Self::Internal(_) => "internal_error",
            Self::Transport(TransportError::Auth(_)) => "transport_auth_failed",
            Self::Transport(_) => "transport_error",
            Self::Metadata(MetadataError::AlreadyExists(_)) => "conflict",
            Self::Metadata(_) => "metadata_error",
            Self::Core(_) => "bad_request",
            Self::Crypt(_) => "encryption_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::EncryptionKeyMissing => StatusCode::BAD_REQUEST,
            Self::UploadFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Transport(e) => match e {
                TransportError::Auth(_) => StatusCode::UNAUTHORIZED,
                TransportError::InvalidRequest(_)
                | TransportError::SizeMismatch { .. }
                | TransportError::Io(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::Metadata(e) => match e {
                MetadataError::NotFound(_) => StatusCode::NOT_FOUND,
                MetadataError::AlreadyExists(_) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Core(_) => StatusCode::BAD_REQUEST,
            Self::Crypt(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::EncryptionKeyMissing, StatusCode::BAD_REQUEST),
            (
                ApiError::UploadFailed("message missing".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::Metadata(MetadataError::AlreadyExists("part 1".into())),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::Transport(TransportError::Auth("rejected".into())),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ApiError::Transport(TransportError::Rpc {
                    code: 500,
                    message: "INTERNAL".into(),
                }),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ApiError::Core(ferry_core::Error::InvalidPartNo(0)),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{err}");
        }
    }

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ApiError::EncryptionKeyMissing.code(), "encryption_key_missing");
        assert_eq!(ApiError::UploadFailed("x".into()).code(), "upload_failed");
        assert_eq!(
            ApiError::Metadata(MetadataError::AlreadyExists("x".into())).code(),
            "conflict"
        );
    }
}
