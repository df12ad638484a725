//! TTL cache in front of the default-channel and delegated-identity lookups.
//!
//! A miss falls through to the metadata store. Empty results are not cached
//! so a newly configured channel or bot is picked up on the next request.

use dashmap::DashMap;
use ferry_metadata::{ChannelRepo, MetadataResult, MetadataStore};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Concurrent map whose entries expire `ttl` after insertion.
pub struct TtlMap<K, V> {
    ttl: Duration,
    entries: DashMap<K, Entry<V>>,
}

impl<K, V> TtlMap<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let hit = self
            .entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone());
        if hit.is_none() {
            self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        }
        hit
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cached channel and identity lookups.
pub struct LookupCache {
    metadata: Arc<dyn MetadataStore>,
    default_channels: TtlMap<i64, i64>,
    bot_tokens: TtlMap<(i64, i64), Arc<[String]>>,
}

impl LookupCache {
    pub fn new(metadata: Arc<dyn MetadataStore>, ttl: Duration) -> Self {
        Self {
            metadata,
            default_channels: TtlMap::new(ttl),
            bot_tokens: TtlMap::new(ttl),
        }
    }

    /// Default channel of `user_id`, if one is configured.
    pub async fn default_channel(&self, user_id: i64) -> MetadataResult<Option<i64>> {
        if let Some(channel_id) = self.default_channels.get(&user_id) {
            return Ok(Some(channel_id));
        }
        let channel_id = self.metadata.get_default_channel(user_id).await?;
        if let Some(channel_id) = channel_id {
            self.default_channels.insert(user_id, channel_id);
        }
        Ok(channel_id)
    }

    /// Delegated identity tokens of `user_id` for `channel_id`.
    pub async fn bot_tokens(&self, user_id: i64, channel_id: i64) -> MetadataResult<Arc<[String]>> {
        let key = (user_id, channel_id);
        if let Some(tokens) = self.bot_tokens.get(&key) {
            return Ok(tokens);
        }
        let tokens: Arc<[String]> = self
            .metadata
            .get_bot_tokens(user_id, channel_id)
            .await?
            .into();
        if !tokens.is_empty() {
            self.bot_tokens.insert(key, tokens.clone());
        }
        Ok(tokens)
    }

    /// Drop expired entries from both maps.
    pub fn cleanup(&self) -> usize {
        self.default_channels.cleanup() + self.bot_tokens.cleanup()
    }
}
