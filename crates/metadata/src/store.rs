//! Metadata store trait and SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{ChannelRepo, SessionRepo, UploadRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: UploadRepo + ChannelRepo + SessionRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `path` and apply the schema.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let busy_timeout = Duration::from_secs(query_timeout_secs.unwrap_or(5));
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(busy_timeout);

        // A single connection avoids "database is locked" under concurrent writers.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::debug!(path = %path.display(), "opened SQLite metadata store");
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Parse a `YYYY-MM-DD` day produced by SQLite's `date()`.
pub(crate) fn parse_day(day: &str) -> MetadataResult<time::Date> {
    let format = time::macros::format_description!("[year]-[month]-[day]");
    time::Date::parse(day, format)
        .map_err(|e| MetadataError::Internal(format!("invalid day '{day}': {e}")))
}

/// UTC day a part's bytes are accounted to.
pub(crate) fn usage_day(created_at: time::OffsetDateTime) -> time::Date {
    created_at.to_offset(time::UtcOffset::UTC).date()
}

// Timestamps are stored as text; comparisons go through julianday() so that
// values with and without fractional seconds order correctly.
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use time::{Date, OffsetDateTime};

    #[async_trait]
    impl UploadRepo for SqliteStore {
        async fn create_part(
            &self,
            part: &UploadPartRow,
            expired_before: OffsetDateTime,
        ) -> MetadataResult<()> {
            let mut tx = self.pool.begin().await?;

            let replaced = sqlx::query(
                "DELETE FROM uploads WHERE upload_id = ? AND part_no = ? AND julianday(created_at) <= julianday(?)",
            )
            .bind(&part.upload_id)
            .bind(part.part_no)
            .bind(expired_before)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            if replaced > 0 {
                tracing::debug!(
                    upload_id = %part.upload_id,
                    part_no = part.part_no,
                    "replacing expired part"
                );
            }

            sqlx::query(
                r#"
                INSERT INTO uploads (
                    upload_id, part_no, name, channel_id, part_id, size,
                    user_id, encrypted, salt, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&part.upload_id)
            .bind(part.part_no)
            .bind(&part.name)
            .bind(part.channel_id)
            .bind(part.part_id)
            .bind(part.size)
            .bind(part.user_id)
            .bind(part.encrypted)
            .bind(&part.salt)
            .bind(part.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                MetadataError::from_insert(e, || {
                    format!("part {} of upload {}", part.part_no, part.upload_id)
                })
            })?;

            sqlx::query(
                r#"
                INSERT INTO daily_usage (user_id, day, total_uploaded) VALUES (?, ?, ?)
                ON CONFLICT(user_id, day)
                DO UPDATE SET total_uploaded = total_uploaded + excluded.total_uploaded
                "#,
            )
            .bind(part.user_id)
            .bind(usage_day(part.created_at).to_string())
            .bind(part.size)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        }

        async fn get_part(
            &self,
            upload_id: &str,
            part_no: i32,
        ) -> MetadataResult<Option<UploadPartRow>> {
            let row = sqlx::query_as::<_, UploadPartRow>(
                "SELECT * FROM uploads WHERE upload_id = ? AND part_no = ?",
            )
            .bind(upload_id)
            .bind(part_no)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn get_parts(
            &self,
            upload_id: &str,
            created_after: OffsetDateTime,
        ) -> MetadataResult<Vec<UploadPartRow>> {
            let rows = sqlx::query_as::<_, UploadPartRow>(
                r#"
                SELECT * FROM uploads
                WHERE upload_id = ? AND julianday(created_at) > julianday(?)
                ORDER BY part_no
                "#,
            )
            .bind(upload_id)
            .bind(created_after)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn delete_upload(&self, upload_id: &str) -> MetadataResult<u64> {
            let result = sqlx::query("DELETE FROM uploads WHERE upload_id = ?")
                .bind(upload_id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        }

        async fn delete_parts_created_before(
            &self,
            cutoff: OffsetDateTime,
        ) -> MetadataResult<u64> {
            let result =
                sqlx::query("DELETE FROM uploads WHERE julianday(created_at) <= julianday(?)")
                    .bind(cutoff)
                    .execute(&self.pool)
                    .await?;
            Ok(result.rows_affected())
        }

        async fn upload_stats(
            &self,
            user_id: i64,
            days: u32,
            today: Date,
        ) -> MetadataResult<Vec<UploadStatsRow>> {
            if days == 0 {
                return Ok(Vec::new());
            }
            let today = today.to_string();
            let rows: Vec<(String, i64)> = sqlx::query_as(
                r#"
                WITH RECURSIVE spine(day) AS (
                    SELECT date(?, ?)
                    UNION ALL
                    SELECT date(day, '+1 day') FROM spine WHERE day < date(?)
                )
                SELECT spine.day, CAST(COALESCE(SUM(d.total_uploaded), 0) AS INTEGER)
                FROM spine
                LEFT JOIN daily_usage d
                    ON d.day = spine.day AND d.user_id = ?
                GROUP BY spine.day
                ORDER BY spine.day
                "#,
            )
            .bind(&today)
            .bind(format!("-{} days", days - 1))
            .bind(&today)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

            rows.into_iter()
                .map(|(day, total_uploaded)| {
                    Ok(UploadStatsRow {
                        upload_date: parse_day(&day)?,
                        total_uploaded,
                    })
                })
                .collect()
        }
    }

    #[async_trait]
    impl ChannelRepo for SqliteStore {
        async fn upsert_channel(&self, channel: &ChannelRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO channels (user_id, channel_id, channel_name, is_default, created_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(user_id, channel_id) DO UPDATE SET channel_name = excluded.channel_name
                "#,
            )
            .bind(channel.user_id)
            .bind(channel.channel_id)
            .bind(&channel.channel_name)
            .bind(false)
            .bind(channel.created_at)
            .execute(&self.pool)
            .await?;

            if channel.is_default {
                self.set_default_channel(channel.user_id, channel.channel_id)
                    .await?;
            }
            Ok(())
        }

        async fn set_default_channel(&self, user_id: i64, channel_id: i64) -> MetadataResult<()> {
            let mut tx = self.pool.begin().await?;
            sqlx::query("UPDATE channels SET is_default = 0 WHERE user_id = ? AND is_default = 1")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            let result = sqlx::query(
                "UPDATE channels SET is_default = 1 WHERE user_id = ? AND channel_id = ?",
            )
            .bind(user_id)
            .bind(channel_id)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "channel {channel_id} for user {user_id}"
                )));
            }
            tx.commit().await?;
            Ok(())
        }

        async fn get_default_channel(&self, user_id: i64) -> MetadataResult<Option<i64>> {
            let channel = sqlx::query_scalar(
                "SELECT channel_id FROM channels WHERE user_id = ? AND is_default = 1",
            )
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(channel)
        }

        async fn add_bot(&self, bot: &BotRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO bots (user_id, channel_id, token, created_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(user_id, channel_id, token) DO NOTHING
                "#,
            )
            .bind(bot.user_id)
            .bind(bot.channel_id)
            .bind(&bot.token)
            .bind(bot.created_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_bot_tokens(
            &self,
            user_id: i64,
            channel_id: i64,
        ) -> MetadataResult<Vec<String>> {
            let tokens = sqlx::query_scalar(
                "SELECT token FROM bots WHERE user_id = ? AND channel_id = ? ORDER BY bot_seq",
            )
            .bind(user_id)
            .bind(channel_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(tokens)
        }
    }

    #[async_trait]
    impl SessionRepo for SqliteStore {
        async fn create_session(&self, session: &SessionRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO sessions (session_hash, user_id, transport_session, created_at, expires_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&session.session_hash)
            .bind(session.user_id)
            .bind(&session.transport_session)
            .bind(session.created_at)
            .bind(session.expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                MetadataError::from_insert(e, || format!("session for user {}", session.user_id))
            })?;
            Ok(())
        }

        async fn get_session(&self, session_hash: &str) -> MetadataResult<Option<SessionRow>> {
            let row =
                sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE session_hash = ?")
                    .bind(session_hash)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn delete_session(&self, session_hash: &str) -> MetadataResult<bool> {
            let result = sqlx::query("DELETE FROM sessions WHERE session_hash = ?")
                .bind(session_hash)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
-- Upload ledger: one row per transmitted, verified part
CREATE TABLE IF NOT EXISTS uploads (
    upload_id TEXT NOT NULL,
    part_no INTEGER NOT NULL CHECK (part_no >= 1),
    name TEXT NOT NULL,
    channel_id INTEGER NOT NULL,
    part_id INTEGER NOT NULL,
    size INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    encrypted INTEGER NOT NULL DEFAULT 0,
    salt TEXT,
    created_at TEXT NOT NULL,
    PRIMARY KEY (upload_id, part_no)
);
CREATE INDEX IF NOT EXISTS idx_uploads_created_at ON uploads(created_at);
CREATE INDEX IF NOT EXISTS idx_uploads_user ON uploads(user_id);

-- Bytes uploaded per user and UTC day; outlives swept and deleted parts
CREATE TABLE IF NOT EXISTS daily_usage (
    user_id INTEGER NOT NULL,
    day TEXT NOT NULL,
    total_uploaded INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (user_id, day)
);

-- Channels owned by a user
CREATE TABLE IF NOT EXISTS channels (
    user_id INTEGER NOT NULL,
    channel_id INTEGER NOT NULL,
    channel_name TEXT NOT NULL,
    is_default INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    PRIMARY KEY (user_id, channel_id)
);
-- At most one default channel per user
CREATE UNIQUE INDEX IF NOT EXISTS idx_channels_default ON channels(user_id) WHERE is_default = 1;

-- Delegated identities per channel
CREATE TABLE IF NOT EXISTS bots (
    bot_seq INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    channel_id INTEGER NOT NULL,
    token TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (user_id, channel_id, token)
);

-- API sessions, keyed by bearer token digest
CREATE TABLE IF NOT EXISTS sessions (
    session_hash TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL,
    transport_session TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_day() {
        let day = parse_day("2026-03-09").unwrap();
        assert_eq!(day, time::macros::date!(2026 - 03 - 09));
        assert!(parse_day("09/03/2026").is_err());
    }

    #[test]
    fn test_usage_day_is_utc() {
        let late_evening = time::macros::datetime!(2026-03-09 23:30 -02:00);
        assert_eq!(usage_day(late_evening), time::macros::date!(2026 - 03 - 10));
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(temp_dir.path().join("ledger.db"), None)
            .await
            .unwrap();
        store.migrate().await.unwrap();
        store.health_check().await.unwrap();
    }
}
