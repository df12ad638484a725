//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::*;
use crate::repos::{ChannelRepo, SessionRepo, UploadRepo};
use crate::store::{MetadataStore, usage_day};
use async_trait::async_trait;
use ferry_core::config::PgSslMode;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use time::{Date, OffsetDateTime};

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Connect using a full connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Connect using individual parameters, so the password can come from
    /// its own environment variable.
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }
        if let Some(pass) = password {
            opts = opts.password(pass);
        }
        if let Some(mode) = ssl_mode {
            opts = opts.ssl_mode(match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            });
        }

        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "connecting to PostgreSQL"
        );

        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{timeout_ms}ms"))]);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // Prepared statements cannot hold several commands.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl UploadRepo for PostgresStore {
    async fn create_part(
        &self,
        part: &UploadPartRow,
        expired_before: OffsetDateTime,
    ) -> MetadataResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM uploads WHERE upload_id = $1 AND part_no = $2 AND created_at <= $3",
        )
        .bind(&part.upload_id)
        .bind(part.part_no)
        .bind(expired_before)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO uploads (
                upload_id, part_no, name, channel_id, part_id, size,
                user_id, encrypted, salt, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
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
            INSERT INTO daily_usage (user_id, day, total_uploaded) VALUES ($1, $2, $3)
            ON CONFLICT (user_id, day)
            DO UPDATE SET total_uploaded = daily_usage.total_uploaded + EXCLUDED.total_uploaded
            "#,
        )
        .bind(part.user_id)
        .bind(usage_day(part.created_at))
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
            "SELECT * FROM uploads WHERE upload_id = $1 AND part_no = $2",
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
            "SELECT * FROM uploads WHERE upload_id = $1 AND created_at > $2 ORDER BY part_no",
        )
        .bind(upload_id)
        .bind(created_after)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_upload(&self, upload_id: &str) -> MetadataResult<u64> {
        let result = sqlx::query("DELETE FROM uploads WHERE upload_id = $1")
            .bind(upload_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_parts_created_before(&self, cutoff: OffsetDateTime) -> MetadataResult<u64> {
        let result = sqlx::query("DELETE FROM uploads WHERE created_at <= $1")
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
        let span = i32::try_from(days - 1)
            .map_err(|_| MetadataError::Internal(format!("stats window of {days} days")))?;
        let rows: Vec<(Date, i64)> = sqlx::query_as(
            r#"
            SELECT spine.day::date, COALESCE(SUM(d.total_uploaded), 0)::bigint
            FROM generate_series(
                ($1::date - $2::int)::timestamp,
                $1::date::timestamp,
                interval '1 day'
            ) AS spine(day)
            LEFT JOIN daily_usage d
                ON d.day = spine.day::date
                AND d.user_id = $3
            GROUP BY spine.day
            ORDER BY spine.day
            "#,
        )
        .bind(today)
        .bind(span)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(upload_date, total_uploaded)| UploadStatsRow {
                upload_date,
                total_uploaded,
            })
            .collect())
    }
}

#[async_trait]
impl ChannelRepo for PostgresStore {
    async fn upsert_channel(&self, channel: &ChannelRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO channels (user_id, channel_id, channel_name, is_default, created_at)
            VALUES ($1, $2, $3, FALSE, $4)
            ON CONFLICT (user_id, channel_id) DO UPDATE SET channel_name = EXCLUDED.channel_name
            "#,
        )
        .bind(channel.user_id)
        .bind(channel.channel_id)
        .bind(&channel.channel_name)
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
        sqlx::query("UPDATE channels SET is_default = FALSE WHERE user_id = $1 AND is_default")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query(
            "UPDATE channels SET is_default = TRUE WHERE user_id = $1 AND channel_id = $2",
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
            "SELECT channel_id FROM channels WHERE user_id = $1 AND is_default",
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
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, channel_id, token) DO NOTHING
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

    async fn get_bot_tokens(&self, user_id: i64, channel_id: i64) -> MetadataResult<Vec<String>> {
        let tokens = sqlx::query_scalar(
            "SELECT token FROM bots WHERE user_id = $1 AND channel_id = $2 ORDER BY bot_seq",
        )
        .bind(user_id)
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tokens)
    }
}

#[async_trait]
impl SessionRepo for PostgresStore {
    async fn create_session(&self, session: &SessionRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (session_hash, user_id, transport_session, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
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
        let row = sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE session_hash = $1")
            .bind(session_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn delete_session(&self, session_hash: &str) -> MetadataResult<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE session_hash = $1")
            .bind(session_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
