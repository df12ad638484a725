//! Transport abstraction traits.

use crate::call::{Call, Reply};
use crate::error::TransportResult;
use crate::identity::Identity;
use async_trait::async_trait;
use std::sync::Arc;

/// Base call abstraction. Middleware wraps one invoker in another.
#[async_trait]
pub trait Invoker: Send + Sync + 'static {
    /// Perform one remote call.
    async fn invoke(&self, call: &Call) -> TransportResult<Reply>;
}

/// A live, authenticated connection.
pub trait Connection: Invoker {
    /// Release the connection. Further calls fail with `TransportError::Closed`.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Factory for authenticated connections.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a connection authenticated as `identity`.
    ///
    /// Fails with `TransportError::Auth` when the credentials are rejected.
    async fn connect(&self, identity: &Identity) -> TransportResult<Arc<dyn Connection>>;

    /// Get the name of this transport backend.
    ///
    /// Used for metrics and logging.
    fn backend_name(&self) -> &'static str;
}
