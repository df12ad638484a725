//! Delegated credential rotation.
//!
//! Each channel owns a ring of delegated identity tokens and a rotation
//! cursor. The cursor is never exposed: callers only see [`CredentialPool::next`],
//! which advances it atomically, so concurrent uploads to one channel spread
//! evenly over its identities.

use crate::call::ChannelId;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Round-robin pool of delegated identities, keyed by channel.
#[derive(Default)]
pub struct CredentialPool {
    channels: DashMap<ChannelId, Arc<Ring>>,
}

struct Ring {
    tokens: RwLock<Arc<[String]>>,
    cursor: AtomicUsize,
}

impl Ring {
    fn snapshot(&self) -> Arc<[String]> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CredentialPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the identity list for `channel`.
    ///
    /// Setting the list a channel already has is a no-op, so the cursor keeps
    /// advancing across requests. An empty list removes the channel.
    pub fn set(&self, tokens: &[String], channel: ChannelId) {
        if tokens.is_empty() {
            self.channels.remove(&channel);
            return;
        }

        let ring = self
            .channels
            .entry(channel)
            .or_insert_with(|| {
                Arc::new(Ring {
                    tokens: RwLock::new(Arc::from(tokens)),
                    cursor: AtomicUsize::new(0),
                })
            })
            .clone();

        let mut current = ring.tokens.write().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref() != tokens {
            tracing::debug!(
                channel_id = channel,
                identities = tokens.len(),
                "refreshed delegated identities"
            );
            *current = Arc::from(tokens);
        }
    }

    /// Next identity for `channel` and its index in the list.
    ///
    /// Returns `None` when the channel has no delegated identities. The index
    /// is always within the list the token was taken from.
    pub fn next(&self, channel: ChannelId) -> Option<(String, usize)> {
        let ring = self.channels.get(&channel)?.clone();
        let tokens = ring.snapshot();
        if tokens.is_empty() {
            return None;
        }
        let index = ring.cursor.fetch_add(1, Ordering::Relaxed) % tokens.len();
        Some((tokens[index].clone(), index))
    }

    /// Number of identities registered for `channel`.
    pub fn len(&self, channel: ChannelId) -> usize {
        self.channels
            .get(&channel)
            .map(|ring| ring.snapshot().len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, channel: ChannelId) -> bool {
        self.len(channel) == 0
    }
}
