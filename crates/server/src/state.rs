//! Application state shared across handlers.

use crate::cache::LookupCache;
use ferry_core::config::AppConfig;
use ferry_metadata::MetadataStore;
use ferry_transport::{Connector, CredentialPool, MiddlewareChain, middleware};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Metadata store holding the upload ledger.
    pub metadata: Arc<dyn MetadataStore>,
    /// Factory for authenticated transport connections.
    pub connector: Arc<dyn Connector>,
    /// Delegated identity rotation, shared by every request.
    pub credentials: Arc<CredentialPool>,
    /// Middleware chain applied to every request-scoped pool.
    pub middleware: MiddlewareChain,
    /// Cached default-channel and identity lookups.
    pub lookups: Arc<LookupCache>,
}

impl AppState {
    /// Build the state. The middleware chain is built once from the
    /// transport settings and reused by every upload.
    pub fn new(
        config: AppConfig,
        metadata: Arc<dyn MetadataStore>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let middleware = middleware::from_config(&config.transport);
        let lookups = Arc::new(LookupCache::new(metadata.clone(), config.cache.ttl()));

        Self {
            config: Arc::new(config),
            metadata,
            connector,
            credentials: Arc::new(CredentialPool::new()),
            middleware,
            lookups,
        }
    }

    /// Rows created at or before this instant are outside the retention window.
    pub fn retention_cutoff(&self, now: time::OffsetDateTime) -> time::OffsetDateTime {
        now.checked_sub(self.config.uploads.retention())
            .unwrap_or(time::OffsetDateTime::UNIX_EPOCH)
    }
}
