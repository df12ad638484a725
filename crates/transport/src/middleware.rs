//! Resilience middleware wrapped around every transport call.
//!
//! A chain is an ordered list of [`Middleware`] applied by decorator
//! composition: the first entry wraps the base invoker and sits nearest the
//! transport, the last entry is outermost. [`from_config`] builds the standard
//! chain once from settings; it is then applied to every pool.
//!
//! Standard order, innermost first:
//! 1. [`FloodWait`] sleeps through advertised flood waits
//! 2. [`RateLimit`] per-identity token bucket
//! 3. [`Reconnect`] exponential backoff on disconnects
//! 4. [`RetryCeiling`] bounded attempts with a fixed delay

use crate::backoff::BackoffPolicy;
use crate::call::{Call, Reply};
use crate::error::{TransportError, TransportResult};
use crate::identity::Identity;
use crate::traits::Invoker;
use async_trait::async_trait;
use dashmap::DashMap;
use ferry_core::config::TransportConfig;
use governor::{
    Quota, RateLimiter, clock::DefaultClock, middleware::NoOpMiddleware, state::InMemoryState,
};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// A wrapper applied around an invoker.
pub trait Middleware: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decorate `next` for calls made as `identity`.
    fn wrap(&self, identity: &Identity, next: Arc<dyn Invoker>) -> Arc<dyn Invoker>;
}

/// Shared, ordered middleware chain.
pub type MiddlewareChain = Arc<[Arc<dyn Middleware>]>;

/// Build the standard chain from configuration.
pub fn from_config(config: &TransportConfig) -> MiddlewareChain {
    let chain: Vec<Arc<dyn Middleware>> = vec![
        Arc::new(FloodWait::new(
            config.flood_max_wait(),
            config.flood_max_retries,
        )),
        Arc::new(RateLimit::new(config.rate_period(), config.rate_burst)),
        Arc::new(Reconnect::new(BackoffPolicy::from_config(config))),
        Arc::new(RetryCeiling::new(
            config.max_retries,
            config.retry_interval(),
        )),
    ];
    chain.into()
}

/// Apply `chain` around `base`, first entry innermost.
pub fn apply(
    chain: &[Arc<dyn Middleware>],
    identity: &Identity,
    base: Arc<dyn Invoker>,
) -> Arc<dyn Invoker> {
    chain
        .iter()
        .fold(base, |next, middleware| middleware.wrap(identity, next))
}

// =============================================================================
// Flood wait
// =============================================================================

/// Sleeps through transport flood-wait signals and repeats the call.
///
/// Waits longer than `max_wait`, or more than `max_retries` waits for one
/// call, surface the flood-wait error to the caller.
#[derive(Clone, Debug)]
pub struct FloodWait {
    max_wait: Duration,
    max_retries: u32,
}

impl FloodWait {
    pub fn new(max_wait: Duration, max_retries: u32) -> Self {
        Self {
            max_wait,
            max_retries,
        }
    }
}

impl Middleware for FloodWait {
    fn name(&self) -> &'static str {
        "flood_wait"
    }

    fn wrap(&self, _identity: &Identity, next: Arc<dyn Invoker>) -> Arc<dyn Invoker> {
        Arc::new(FloodWaitInvoker {
            next,
            config: self.clone(),
        })
    }
}

struct FloodWaitInvoker {
    next: Arc<dyn Invoker>,
    config: FloodWait,
}

#[async_trait]
impl Invoker for FloodWaitInvoker {
    async fn invoke(&self, call: &Call) -> TransportResult<Reply> {
        let mut waits = 0;
        loop {
            match self.next.invoke(call).await {
                Err(TransportError::FloodWait(wait))
                    if waits < self.config.max_retries && wait <= self.config.max_wait =>
                {
                    waits += 1;
                    tracing::debug!(
                        call = call.name(),
                        wait_ms = wait.as_millis() as u64,
                        attempt = waits,
                        "flood wait, sleeping before retry"
                    );
                    tokio::time::sleep(wait).await;
                }
                other => return other,
            }
        }
    }
}

// =============================================================================
// Rate limit
// =============================================================================

type KeyedLimiter =
    RateLimiter<String, DashMap<String, InMemoryState>, DefaultClock, NoOpMiddleware>;

/// Token bucket per identity, shared by every pool built from this chain.
pub struct RateLimit {
    limiter: Arc<KeyedLimiter>,
}

impl RateLimit {
    /// One token every `period`, bursting up to `burst`.
    pub fn new(period: Duration, burst: u32) -> Self {
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(burst);
        Self {
            limiter: Arc::new(RateLimiter::dashmap(quota)),
        }
    }
}

impl Middleware for RateLimit {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn wrap(&self, identity: &Identity, next: Arc<dyn Invoker>) -> Arc<dyn Invoker> {
        Arc::new(RateLimitInvoker {
            next,
            limiter: self.limiter.clone(),
            key: identity.key(),
        })
    }
}

struct RateLimitInvoker {
    next: Arc<dyn Invoker>,
    limiter: Arc<KeyedLimiter>,
    key: String,
}

#[async_trait]
impl Invoker for RateLimitInvoker {
    async fn invoke(&self, call: &Call) -> TransportResult<Reply> {
        while let Err(not_until) = self.limiter.check_key(&self.key) {
            let wait =
                not_until.wait_time_from(governor::clock::Clock::now(&DefaultClock::default()));
            tokio::time::sleep(wait).await;
        }
        self.next.invoke(call).await
    }
}

// =============================================================================
// Reconnect
// =============================================================================

/// Repeats a call after disconnects, backing off exponentially.
///
/// The base invoker is expected to dial a fresh connection on the next call
/// after reporting a disconnect. Once the backoff's elapsed budget is spent
/// the failure surfaces as [`TransportError::ReconnectExhausted`].
#[derive(Clone, Debug)]
pub struct Reconnect {
    policy: BackoffPolicy,
}

impl Reconnect {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy }
    }
}

impl Middleware for Reconnect {
    fn name(&self) -> &'static str {
        "reconnect"
    }

    fn wrap(&self, _identity: &Identity, next: Arc<dyn Invoker>) -> Arc<dyn Invoker> {
        Arc::new(ReconnectInvoker {
            next,
            policy: self.policy.clone(),
        })
    }
}

struct ReconnectInvoker {
    next: Arc<dyn Invoker>,
    policy: BackoffPolicy,
}

#[async_trait]
impl Invoker for ReconnectInvoker {
    async fn invoke(&self, call: &Call) -> TransportResult<Reply> {
        let mut sequence = None;
        loop {
            let err = match self.next.invoke(call).await {
                Err(e) if e.is_disconnect() => e,
                other => return other,
            };

            let backoff = sequence.get_or_insert_with(|| self.policy.start());
            match backoff.next_delay() {
                Some(delay) => {
                    tracing::debug!(
                        call = call.name(),
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "connection lost, reconnecting"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    tracing::warn!(
                        call = call.name(),
                        error = %err,
                        elapsed_secs = backoff.elapsed().as_secs(),
                        "giving up on reconnect"
                    );
                    return Err(TransportError::ReconnectExhausted {
                        elapsed: backoff.elapsed(),
                        last: Box::new(err),
                    });
                }
            }
        }
    }
}

// =============================================================================
// Retry ceiling
// =============================================================================

/// Bounds attempts per logical call, with a fixed delay between them.
///
/// Only retryable errors are repeated. When attempts run out the last error
/// is returned unchanged.
#[derive(Clone, Debug)]
pub struct RetryCeiling {
    max_attempts: u32,
    interval: Duration,
}

impl RetryCeiling {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }
}

impl Middleware for RetryCeiling {
    fn name(&self) -> &'static str {
        "retry_ceiling"
    }

    fn wrap(&self, _identity: &Identity, next: Arc<dyn Invoker>) -> Arc<dyn Invoker> {
        Arc::new(RetryCeilingInvoker {
            next,
            config: self.clone(),
        })
    }
}

struct RetryCeilingInvoker {
    next: Arc<dyn Invoker>,
    config: RetryCeiling,
}

#[async_trait]
impl Invoker for RetryCeilingInvoker {
    async fn invoke(&self, call: &Call) -> TransportResult<Reply> {
        let mut attempt = 1;
        loop {
            match self.next.invoke(call).await {
                Err(e) if e.is_retryable() && attempt < self.config.max_attempts => {
                    tracing::debug!(
                        call = call.name(),
                        error = %e,
                        attempt,
                        "transport call failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.config.interval).await;
                }
                Err(e) => {
                    if e.is_retryable() {
                        tracing::warn!(
                            call = call.name(),
                            error = %e,
                            attempts = attempt,
                            "retries exhausted"
                        );
                    }
                    return Err(e);
                }
                ok => return ok,
            }
        }
    }
}
