//! Metadata store wrapper that fails ledger writes on demand and can hold
//! concurrent duplicate checks until all of them have run.

use async_trait::async_trait;
use ferry_metadata::{
    BotRow, ChannelRepo, ChannelRow, MetadataError, MetadataResult, MetadataStore, SessionRepo,
    SessionRow, UploadPartRow, UploadRepo, UploadStatsRow,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use time::{Date, OffsetDateTime};
use tokio::sync::Barrier;

/// Delegates to an inner store, except `create_part` fails while
/// `fail_writes` is set, and the first `gated_lookups` calls to `get_part`
/// wait for each other before reading.
#[allow(dead_code)]
pub struct FailingWrites {
    inner: Arc<dyn MetadataStore>,
    pub fail_writes: AtomicBool,
    pub write_attempts: AtomicUsize,
    lookup_gate: Option<Barrier>,
    gated_lookups: usize,
    lookups: AtomicUsize,
}

#[allow(dead_code)]
impl FailingWrites {
    pub fn new(inner: Arc<dyn MetadataStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_writes: AtomicBool::new(true),
            write_attempts: AtomicUsize::new(0),
            lookup_gate: None,
            gated_lookups: 0,
            lookups: AtomicUsize::new(0),
        })
    }

    /// Writes succeed; the first `uploads` part lookups all complete before
    /// any of them returns, so every one of those uploads sees no duplicate.
    pub fn racing(inner: Arc<dyn MetadataStore>, uploads: usize) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_writes: AtomicBool::new(false),
            write_attempts: AtomicUsize::new(0),
            lookup_gate: Some(Barrier::new(uploads)),
            gated_lookups: uploads,
            lookups: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl UploadRepo for FailingWrites {
    async fn create_part(
        &self,
        part: &UploadPartRow,
        expired_before: OffsetDateTime,
    ) -> MetadataResult<()> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(MetadataError::Internal("injected write failure".to_string()));
        }
        self.inner.create_part(part, expired_before).await
    }

    async fn get_part(
        &self,
        upload_id: &str,
        part_no: i32,
    ) -> MetadataResult<Option<UploadPartRow>> {
        let result = self.inner.get_part(upload_id, part_no).await;
        if let Some(gate) = &self.lookup_gate
            && self.lookups.fetch_add(1, Ordering::SeqCst) < self.gated_lookups
        {
            gate.wait().await;
        }
        result
    }

    async fn get_parts(
        &self,
        upload_id: &str,
        created_after: OffsetDateTime,
    ) -> MetadataResult<Vec<UploadPartRow>> {
        self.inner.get_parts(upload_id, created_after).await
    }

    async fn delete_upload(&self, upload_id: &str) -> MetadataResult<u64> {
        self.inner.delete_upload(upload_id).await
    }

    async fn delete_parts_created_before(&self, cutoff: OffsetDateTime) -> MetadataResult<u64> {
        self.inner.delete_parts_created_before(cutoff).await
    }

    async fn upload_stats(
        &self,
        user_id: i64,
        days: u32,
        today: Date,
    ) -> MetadataResult<Vec<UploadStatsRow>> {
        self.inner.upload_stats(user_id, days, today).await
    }
}

#[async_trait]
impl ChannelRepo for FailingWrites {
    async fn upsert_channel(&self, channel: &ChannelRow) -> MetadataResult<()> {
        self.inner.upsert_channel(channel).await
    }

    async fn set_default_channel(&self, user_id: i64, channel_id: i64) -> MetadataResult<()> {
        self.inner.set_default_channel(user_id, channel_id).await
    }

    async fn get_default_channel(&self, user_id: i64) -> MetadataResult<Option<i64>> {
        self.inner.get_default_channel(user_id).await
    }

    async fn add_bot(&self, bot: &BotRow) -> MetadataResult<()> {
        self.inner.add_bot(bot).await
    }

    async fn get_bot_tokens(&self, user_id: i64, channel_id: i64) -> MetadataResult<Vec<String>> {
        self.inner.get_bot_tokens(user_id, channel_id).await
    }
}

#[async_trait]
impl SessionRepo for FailingWrites {
    async fn create_session(&self, session: &SessionRow) -> MetadataResult<()> {
        self.inner.create_session(session).await
    }

    async fn get_session(&self, session_hash: &str) -> MetadataResult<Option<SessionRow>> {
        self.inner.get_session(session_hash).await
    }

    async fn delete_session(&self, session_hash: &str) -> MetadataResult<bool> {
        self.inner.delete_session(session_hash).await
    }
}

#[async_trait]
impl MetadataStore for FailingWrites {
    async fn migrate(&self) -> MetadataResult<()> {
        self.inner.migrate().await
    }

    async fn health_check(&self) -> MetadataResult<()> {
        self.inner.health_check().await
    }
}
