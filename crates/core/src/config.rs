//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// HTTP server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    /// SECURITY: When enabled, restrict this endpoint to the scraper at the
    /// network level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    /// Largest part a client may upload in one request, in bytes.
    #[serde(default = "default_max_part_size")]
    pub max_part_size: u64,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_max_part_size() -> u64 {
    crate::DEFAULT_MAX_PART_SIZE
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
            max_part_size: default_max_part_size(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_part_size == 0 {
            return Err("server.max_part_size must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Upload engine configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Ledger rows older than this many seconds are treated as absent.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// Master key for part encryption. Encrypted uploads fail fast when unset.
    /// WARNING: Prefer FERRY_UPLOADS__ENCRYPTION_KEY over storing in config.
    #[serde(default)]
    pub encryption_key: Option<String>,
    /// Concurrent chunk saves per part.
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Size of each chunk handed to the transport uploader, in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Run the retention sweep in the background (default: true).
    #[serde(default = "default_sweep_enabled")]
    pub sweep_enabled: bool,
    /// Interval between retention sweeps in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_retention_secs() -> u64 {
    crate::DEFAULT_RETENTION_SECS
}

fn default_threads() -> usize {
    8
}

fn default_chunk_size() -> usize {
    crate::DEFAULT_CHUNK_SIZE
}

fn default_sweep_enabled() -> bool {
    true
}

fn default_sweep_interval_secs() -> u64 {
    3600 // 1 hour
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
            encryption_key: None,
            threads: default_threads(),
            chunk_size: default_chunk_size(),
            sweep_enabled: default_sweep_enabled(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

// Keep the master key out of logs.
impl std::fmt::Debug for UploadConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadConfig")
            .field("retention_secs", &self.retention_secs)
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("threads", &self.threads)
            .field("chunk_size", &self.chunk_size)
            .field("sweep_enabled", &self.sweep_enabled)
            .field("sweep_interval_secs", &self.sweep_interval_secs)
            .finish()
    }
}

impl UploadConfig {
    /// Retention window as a `time::Duration`.
    pub fn retention(&self) -> time::Duration {
        // Saturate at i64::MAX to prevent overflow wrapping to negative
        let secs = i64::try_from(self.retention_secs).unwrap_or(i64::MAX);
        time::Duration::seconds(secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Validate upload configuration.
    /// Returns warnings for settings that are allowed but risky.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        let mut warnings = Vec::new();

        if self.threads == 0 {
            return Err("uploads.threads must be at least 1".to_string());
        }
        if self.chunk_size == 0
            || self.chunk_size % 1024 != 0
            || self.chunk_size > crate::MAX_CHUNK_SIZE
        {
            return Err(format!(
                "uploads.chunk_size={} must be a positive multiple of 1024 no larger than {}",
                self.chunk_size,
                crate::MAX_CHUNK_SIZE
            ));
        }
        if self.retention_secs == 0 {
            return Err("uploads.retention_secs must be greater than 0".to_string());
        }
        if self.sweep_enabled && self.sweep_interval_secs == 0 {
            return Err("uploads.sweep_interval_secs cannot be 0. \
                 This would cause a panic when creating the sweep timer."
                .to_string());
        }

        if !self.sweep_enabled {
            warnings.push(
                "uploads.sweep_enabled=false: expired ledger rows are hidden from \
                 listings but never removed"
                    .to_string(),
            );
        }
        if matches!(self.encryption_key.as_deref(), Some(k) if k.len() < 16) {
            warnings.push(
                "uploads.encryption_key is shorter than 16 bytes. \
                 Use a long random secret."
                    .to_string(),
            );
        }

        Ok(warnings)
    }
}

/// Transport backend selection.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportBackend {
    /// In-process simulated remote (development and tests).
    #[default]
    Memory,
}

/// Transport pool and resilience configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub backend: TransportBackend,
    /// Maximum live connections per upload request.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Token bucket refill period in milliseconds, per identity.
    #[serde(default = "default_rate_ms")]
    pub rate_ms: u64,
    /// Token bucket burst size, per identity.
    #[serde(default = "default_rate_burst")]
    pub rate_burst: u32,
    /// Longest advertised flood wait that is slept through, in seconds.
    #[serde(default = "default_flood_max_wait_secs")]
    pub flood_max_wait_secs: u64,
    /// Flood waits absorbed per call before the error surfaces.
    #[serde(default = "default_flood_max_retries")]
    pub flood_max_retries: u32,
    /// First reconnection delay in milliseconds.
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,
    /// Growth factor between reconnection delays.
    #[serde(default = "default_reconnect_multiplier")]
    pub reconnect_multiplier: f64,
    /// Upper bound on a single reconnection delay, in seconds.
    #[serde(default = "default_reconnect_max_interval_secs")]
    pub reconnect_max_interval_secs: u64,
    /// Total time spent reconnecting before giving up, in seconds.
    #[serde(default = "default_reconnect_max_elapsed_secs")]
    pub reconnect_max_elapsed_secs: u64,
    /// Jitter factor applied to each reconnection delay (0.0 - 1.0).
    #[serde(default = "default_reconnect_randomization")]
    pub reconnect_randomization: f64,
    /// Attempts per logical call, including the first.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fixed delay between retries in milliseconds.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// Timeout for establishing a connection, in seconds.
    #[serde(default = "default_dial_timeout_secs")]
    pub dial_timeout_secs: u64,
}

fn default_pool_size() -> usize {
    8
}

fn default_rate_ms() -> u64 {
    100
}

fn default_rate_burst() -> u32 {
    5
}

fn default_flood_max_wait_secs() -> u64 {
    60
}

fn default_flood_max_retries() -> u32 {
    5
}

fn default_reconnect_initial_ms() -> u64 {
    500
}

fn default_reconnect_multiplier() -> f64 {
    1.1
}

fn default_reconnect_max_interval_secs() -> u64 {
    60
}

fn default_reconnect_max_elapsed_secs() -> u64 {
    120
}

fn default_reconnect_randomization() -> f64 {
    0.5
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_interval_ms() -> u64 {
    5000
}

fn default_dial_timeout_secs() -> u64 {
    10
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            backend: TransportBackend::default(),
            pool_size: default_pool_size(),
            rate_ms: default_rate_ms(),
            rate_burst: default_rate_burst(),
            flood_max_wait_secs: default_flood_max_wait_secs(),
            flood_max_retries: default_flood_max_retries(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_multiplier: default_reconnect_multiplier(),
            reconnect_max_interval_secs: default_reconnect_max_interval_secs(),
            reconnect_max_elapsed_secs: default_reconnect_max_elapsed_secs(),
            reconnect_randomization: default_reconnect_randomization(),
            max_retries: default_max_retries(),
            retry_interval_ms: default_retry_interval_ms(),
            dial_timeout_secs: default_dial_timeout_secs(),
        }
    }
}

impl TransportConfig {
    pub fn rate_period(&self) -> Duration {
        Duration::from_millis(self.rate_ms)
    }

    pub fn flood_max_wait(&self) -> Duration {
        Duration::from_secs(self.flood_max_wait_secs)
    }

    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms)
    }

    pub fn reconnect_max_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_max_interval_secs)
    }

    pub fn reconnect_max_elapsed(&self) -> Duration {
        Duration::from_secs(self.reconnect_max_elapsed_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }

    /// Validate transport configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.pool_size == 0 {
            return Err("transport.pool_size must be at least 1".to_string());
        }
        if self.rate_ms == 0 || self.rate_burst == 0 {
            return Err("transport.rate_ms and transport.rate_burst must be at least 1".to_string());
        }
        if !(self.reconnect_multiplier >= 1.0) {
            return Err(format!(
                "transport.reconnect_multiplier={} must be >= 1.0",
                self.reconnect_multiplier
            ));
        }
        if !(0.0..=1.0).contains(&self.reconnect_randomization) {
            return Err(format!(
                "transport.reconnect_randomization={} must be between 0.0 and 1.0",
                self.reconnect_randomization
            ));
        }
        if self.max_retries == 0 {
            return Err("transport.max_retries must be at least 1".to_string());
        }
        if self.dial_timeout_secs == 0 {
            return Err("transport.dial_timeout_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    /// Disable SSL/TLS entirely.
    Disable,
    /// Prefer SSL/TLS but allow unencrypted connections (default).
    #[default]
    Prefer,
    /// Require SSL/TLS for all connections.
    Require,
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database (single node deployments and tests).
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Query timeout in seconds (advisory only, SQLite cannot cancel queries).
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL. Takes precedence over individual fields.
        url: Option<String>,
        host: Option<String>,
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        username: Option<String>,
        /// WARNING: Prefer FERRY_METADATA__PASSWORD over storing in config.
        password: Option<String>,
        database: Option<String>,
        ssl_mode: Option<PgSslMode>,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Statement timeout in milliseconds (prevents hung queries).
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(60000) // 1 minute
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(60)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/ferry.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { .. } => Ok(()),
            MetadataConfig::Postgres {
                url,
                host,
                database,
                ..
            } => match (url.as_ref(), host.as_ref(), database.as_ref()) {
                (Some(_), _, _) => Ok(()),
                (None, Some(_), Some(_)) => Ok(()),
                (None, None, _) => {
                    Err("postgres config requires either 'url' or 'host' + 'database'".to_string())
                }
                (None, Some(_), None) => Err(
                    "postgres config requires 'database' when using individual fields".to_string(),
                ),
            },
        }
    }
}

/// Lookup cache configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Lifetime of cached default-channel and credential lookups, in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_cache_ttl_secs() -> u64 {
    300 // 5 minutes
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub uploads: UploadConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl AppConfig {
    /// Create a test configuration with fast retry timings.
    ///
    /// **For testing only.** Uses SQLite metadata, the memory transport and
    /// a fixed encryption key.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            uploads: UploadConfig {
                encryption_key: Some("test-master-key-0123456789".to_string()),
                threads: 4,
                chunk_size: 64 * 1024,
                sweep_enabled: false,
                ..UploadConfig::default()
            },
            transport: TransportConfig {
                pool_size: 4,
                rate_ms: 1,
                rate_burst: 1000,
                flood_max_wait_secs: 5,
                reconnect_initial_ms: 5,
                reconnect_max_interval_secs: 1,
                reconnect_max_elapsed_secs: 2,
                max_retries: 3,
                retry_interval_ms: 10,
                dial_timeout_secs: 5,
                ..TransportConfig::default()
            },
            metadata: MetadataConfig::default(),
            cache: CacheConfig::default(),
        }
    }

    /// Validate every section. Returns warnings to be logged at startup.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        self.server.validate()?;
        self.transport.validate()?;
        self.metadata.validate()?;
        self.uploads.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_defaults_match_documented_values() {
        let config = TransportConfig::default();
        assert_eq!(config.reconnect_multiplier, 1.1);
        assert_eq!(config.reconnect_max_elapsed(), Duration::from_secs(120));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_interval(), Duration::from_secs(5));
        assert_eq!(config.dial_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_upload_config_deserialize_partial() {
        let json = r#"{"retention_secs": 60, "encryption_key": "k"}"#;
        let config: UploadConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.retention_secs, 60);
        assert_eq!(config.chunk_size, crate::DEFAULT_CHUNK_SIZE);
        assert_eq!(config.retention(), time::Duration::seconds(60));
    }

    #[test]
    fn test_upload_config_debug_redacts_key() {
        let config = UploadConfig {
            encryption_key: Some("super-secret".to_string()),
            ..UploadConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_upload_config_rejects_bad_chunk_size() {
        for chunk_size in [0, 1000, crate::MAX_CHUNK_SIZE + 1024] {
            let config = UploadConfig {
                chunk_size,
                ..UploadConfig::default()
            };
            assert!(config.validate().is_err(), "chunk_size={chunk_size}");
        }
    }

    #[test]
    fn test_upload_config_warns_when_sweep_disabled() {
        let config = UploadConfig {
            sweep_enabled: false,
            ..UploadConfig::default()
        };
        let warnings = config.validate().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("sweep_enabled"));
    }

    #[test]
    fn test_transport_validate_rejects_shrinking_backoff() {
        let config = TransportConfig {
            reconnect_multiplier: 0.5,
            ..TransportConfig::default()
        };
        assert!(config.validate().is_err());

        let config = TransportConfig {
            pool_size: 0,
            ..TransportConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_metadata_config_postgres_requires_database() {
        let config = MetadataConfig::Postgres {
            url: None,
            host: Some("localhost".to_string()),
            port: Some(5432),
            username: None,
            password: None,
            database: None,
            ssl_mode: None,
            max_connections: 10,
            statement_timeout_ms: None,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_metadata_config_tagged_sqlite() {
        let json = r#"{"type": "sqlite", "path": "/tmp/ferry.db"}"#;
        let config: MetadataConfig = serde_json::from_str(json).unwrap();
        match config {
            MetadataConfig::Sqlite {
                path,
                query_timeout_secs,
            } => {
                assert_eq!(path, PathBuf::from("/tmp/ferry.db"));
                assert_eq!(query_timeout_secs, Some(60));
            }
            _ => panic!("expected sqlite config"),
        }
    }

    #[test]
    fn test_app_config_for_testing_is_valid() {
        let config = AppConfig::for_testing();
        let warnings = config.validate().unwrap();
        assert!(warnings.iter().any(|w| w.contains("sweep_enabled")));
    }
}
