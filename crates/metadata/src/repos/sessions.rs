//! API session repository.

use crate::error::MetadataResult;
use crate::models::SessionRow;
use async_trait::async_trait;

/// Repository for authenticated API sessions.
#[async_trait]
pub trait SessionRepo: Send + Sync {
    async fn create_session(&self, session: &SessionRow) -> MetadataResult<()>;

    /// Look up a session by the SHA-256 hex digest of its bearer token.
    async fn get_session(&self, session_hash: &str) -> MetadataResult<Option<SessionRow>>;

    /// Returns whether a session was removed.
    async fn delete_session(&self, session_hash: &str) -> MetadataResult<bool>;
}
