//! Database models mapping to the metadata schema.

use sqlx::FromRow;
use time::{Date, OffsetDateTime};

// =============================================================================
// Upload ledger
// =============================================================================

/// One transmitted, verified part of an upload session.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct UploadPartRow {
    pub upload_id: String,
    pub part_no: i32,
    pub name: String,
    pub channel_id: i64,
    /// Transport-assigned identifier of the message carrying the part.
    pub part_id: i64,
    /// Transmitted byte length, after encryption when `encrypted` is set.
    pub size: i64,
    pub user_id: i64,
    pub encrypted: bool,
    /// Present iff `encrypted`.
    pub salt: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Bytes uploaded by one user on one UTC day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadStatsRow {
    pub upload_date: Date,
    pub total_uploaded: i64,
}

// =============================================================================
// Channels and delegated identities
// =============================================================================

/// A remote channel owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ChannelRow {
    pub user_id: i64,
    pub channel_id: i64,
    pub channel_name: String,
    /// At most one channel per user is the default.
    pub is_default: bool,
    pub created_at: OffsetDateTime,
}

/// Delegated identity token usable to send to a user's channel.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct BotRow {
    pub user_id: i64,
    pub channel_id: i64,
    pub token: String,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// API sessions
// =============================================================================

/// Authenticated API session.
///
/// The bearer token itself is never stored, only its SHA-256 hex digest.
#[derive(Clone, PartialEq, Eq, FromRow)]
pub struct SessionRow {
    pub session_hash: String,
    pub user_id: i64,
    /// Stored transport credential used to act as the user.
    pub transport_session: String,
    pub created_at: OffsetDateTime,
    pub expires_at: Option<OffsetDateTime>,
}

impl SessionRow {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl std::fmt::Debug for SessionRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRow")
            .field("session_hash", &self.session_hash)
            .field("user_id", &self.user_id)
            .field("transport_session", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
