//! Channel and delegated identity repository.

use crate::error::MetadataResult;
use crate::models::{BotRow, ChannelRow};
use async_trait::async_trait;

/// Repository for channel ownership and delegated identities.
#[async_trait]
pub trait ChannelRepo: Send + Sync {
    /// Insert or rename a channel. The default flag is left untouched on update.
    async fn upsert_channel(&self, channel: &ChannelRow) -> MetadataResult<()>;

    /// Make `channel_id` the user's only default channel.
    async fn set_default_channel(&self, user_id: i64, channel_id: i64) -> MetadataResult<()>;

    async fn get_default_channel(&self, user_id: i64) -> MetadataResult<Option<i64>>;

    /// Register a delegated identity. Adding the same token twice is a no-op.
    async fn add_bot(&self, bot: &BotRow) -> MetadataResult<()>;

    /// Delegated identity tokens for a user's channel, in registration order.
    async fn get_bot_tokens(&self, user_id: i64, channel_id: i64) -> MetadataResult<Vec<String>>;
}
