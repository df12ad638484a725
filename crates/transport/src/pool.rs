//! Request-scoped connection pool.
//!
//! A pool belongs to one upload request and one identity. Connections are
//! dialed lazily: an idle connection is reused when one exists, a new one is
//! dialed while the pool is below its bound, and otherwise calls are spread
//! round-robin over the live connections. Dropping the pool closes every
//! connection it opened, on every exit path.

use crate::call::{Call, Reply};
use crate::client::Client;
use crate::error::{TransportError, TransportResult};
use crate::identity::Identity;
use crate::middleware::{self, Middleware};
use crate::traits::{Connection, Connector, Invoker};
use async_trait::async_trait;
use ferry_core::config::TransportConfig;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

/// Bounded set of connections for one identity.
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
    client: Client,
}

impl ConnectionPool {
    /// Create a pool. No connection is opened until the first call.
    pub fn new(
        connector: Arc<dyn Connector>,
        identity: Identity,
        max_size: usize,
        dial_timeout: Duration,
        chain: &[Arc<dyn Middleware>],
    ) -> Self {
        let inner = Arc::new(PoolInner {
            connector,
            identity,
            max_size: max_size.max(1),
            dial_timeout,
            state: Mutex::new(PoolState::default()),
            dialed: Notify::new(),
            cursor: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        });
        let base: Arc<dyn Invoker> = inner.clone();
        let client = Client::new(middleware::apply(chain, &inner.identity, base));
        Self { inner, client }
    }

    pub fn from_config(
        connector: Arc<dyn Connector>,
        identity: Identity,
        config: &TransportConfig,
        chain: &[Arc<dyn Middleware>],
    ) -> Self {
        Self::new(
            connector,
            identity,
            config.pool_size,
            config.dial_timeout(),
            chain,
        )
    }

    /// Client for the current upload. Every call it makes goes through the
    /// middleware chain and then through a pooled connection.
    pub fn default_client(&self) -> Client {
        self.client.clone()
    }

    /// Acquire an idle connection, or dial a new one while below the bound.
    pub async fn acquire(&self) -> TransportResult<Lease> {
        self.inner.acquire().await
    }

    /// Make sure at least one authenticated connection exists.
    ///
    /// Fails with `TransportError::Auth` when the identity is rejected.
    pub async fn authenticate(&self) -> TransportResult<()> {
        self.acquire().await.map(drop)
    }

    pub fn identity(&self) -> &Identity {
        &self.inner.identity
    }

    /// Number of live connections.
    pub fn size(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn max_size(&self) -> usize {
        self.inner.max_size
    }

    /// Close every connection. Later calls fail with `TransportError::Closed`.
    pub fn close(&self) {
        self.inner.close();
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.inner.close();
    }
}

/// A connection checked out of the pool. Released on drop.
pub struct Lease {
    slot: Arc<Slot>,
}

impl Lease {
    fn new(slot: Arc<Slot>) -> Self {
        slot.in_flight.fetch_add(1, Ordering::AcqRel);
        Self { slot }
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.slot.conn
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.slot.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

struct Slot {
    conn: Arc<dyn Connection>,
    in_flight: AtomicUsize,
}

#[derive(Default)]
struct PoolState {
    slots: Vec<Arc<Slot>>,
    dialing: usize,
}

struct PoolInner {
    connector: Arc<dyn Connector>,
    identity: Identity,
    max_size: usize,
    dial_timeout: Duration,
    state: Mutex<PoolState>,
    dialed: Notify,
    cursor: AtomicUsize,
    closed: AtomicBool,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn acquire(&self) -> TransportResult<Lease> {
        loop {
            let notified = {
                let mut state = self.lock();
                if self.closed.load(Ordering::Acquire) {
                    return Err(TransportError::Closed);
                }
                if let Some(slot) = state
                    .slots
                    .iter()
                    .find(|slot| slot.in_flight.load(Ordering::Acquire) == 0)
                {
                    return Ok(Lease::new(slot.clone()));
                }
                if state.slots.len() + state.dialing < self.max_size {
                    state.dialing += 1;
                    None
                } else if !state.slots.is_empty() {
                    let i = self.cursor.fetch_add(1, Ordering::Relaxed) % state.slots.len();
                    return Ok(Lease::new(state.slots[i].clone()));
                } else {
                    // Every permitted connection is still being dialed.
                    Some(self.dialed.notified())
                }
            };

            match notified {
                Some(notified) => notified.await,
                None => return self.dial_slot().await,
            }
        }
    }

    async fn dial_slot(&self) -> TransportResult<Lease> {
        let dialed = match tokio::time::timeout(
            self.dial_timeout,
            self.connector.connect(&self.identity),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(format!(
                "dial timed out after {:?}",
                self.dial_timeout
            ))),
        };

        let lease = {
            let mut state = self.lock();
            state.dialing -= 1;
            match dialed {
                Ok(conn) if self.closed.load(Ordering::Acquire) => {
                    conn.close();
                    Err(TransportError::Closed)
                }
                Ok(conn) => {
                    let slot = Arc::new(Slot {
                        conn,
                        in_flight: AtomicUsize::new(0),
                    });
                    state.slots.push(slot.clone());
                    tracing::debug!(
                        identity = %self.identity.attribution(),
                        connections = state.slots.len(),
                        "opened pooled connection"
                    );
                    Ok(Lease::new(slot))
                }
                Err(e) => Err(e),
            }
        };
        self.dialed.notify_waiters();
        lease
    }

    /// Drop a connection that reported a disconnect so the next call dials.
    fn evict(&self, slot: &Arc<Slot>) {
        let mut state = self.lock();
        state.slots.retain(|s| !Arc::ptr_eq(s, slot));
        slot.conn.close();
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let slots = std::mem::take(&mut self.lock().slots);
        for slot in &slots {
            slot.conn.close();
        }
        if !slots.is_empty() {
            tracing::debug!(
                identity = %self.identity.attribution(),
                connections = slots.len(),
                "closed connection pool"
            );
        }
        self.dialed.notify_waiters();
    }
}

#[async_trait]
impl Invoker for PoolInner {
    async fn invoke(&self, call: &Call) -> TransportResult<Reply> {
        let lease = self.acquire().await?;
        let result = lease.slot.conn.invoke(call).await;
        if let Err(e) = &result
            && e.is_disconnect()
        {
            self.evict(&lease.slot);
        }
        result
    }
}
