//! Transport layer for ferry uploads.
//!
//! This crate provides:
//! - A call-as-data abstraction over the remote message service
//! - Resilience middleware: flood wait, rate limit, reconnect, retry ceiling
//! - A request-scoped connection pool per identity
//! - Round-robin rotation of delegated identities per channel
//! - A chunked file uploader
//! - Backends: in-memory

pub mod backends;
pub mod backoff;
pub mod call;
pub mod client;
pub mod credentials;
pub mod error;
pub mod identity;
pub mod middleware;
pub mod pool;
pub mod traits;
pub mod uploader;

pub use backends::memory::MemoryTransport;
pub use backoff::{Backoff, BackoffPolicy};
pub use call::{
    Call, ChannelId, Document, InputChannel, InputFile, Message, MessageId, Reply, Update,
};
pub use client::{Client, sent_message};
pub use credentials::CredentialPool;
pub use error::{TransportError, TransportResult};
pub use identity::Identity;
pub use middleware::{Middleware, MiddlewareChain};
pub use pool::{ConnectionPool, Lease};
pub use traits::{Connection, Connector, Invoker};
pub use uploader::Uploader;

use ferry_core::config::{TransportBackend, TransportConfig};
use std::sync::Arc;

/// Create a connector from configuration.
pub fn from_config(config: &TransportConfig) -> TransportResult<Arc<dyn Connector>> {
    config.validate().map_err(TransportError::Config)?;

    match config.backend {
        TransportBackend::Memory => {
            tracing::warn!(
                backend = "memory",
                "in-memory transport is not durable: sent parts are lost on restart \
                 while their ledger rows remain"
            );
            Ok(Arc::new(MemoryTransport::auto_provisioning()))
        }
    }
}
