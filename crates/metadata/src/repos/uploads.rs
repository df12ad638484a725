//! Upload ledger repository.

use crate::error::MetadataResult;
use crate::models::{UploadPartRow, UploadStatsRow};
use async_trait::async_trait;
use time::{Date, OffsetDateTime};

/// Repository for upload part records.
#[async_trait]
pub trait UploadRepo: Send + Sync {
    /// Record a transmitted part.
    ///
    /// A row with the same `(upload_id, part_no)` created at or before
    /// `expired_before` is replaced. A live row with the same key fails with
    /// `MetadataError::AlreadyExists`.
    async fn create_part(
        &self,
        part: &UploadPartRow,
        expired_before: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Get a single part regardless of age.
    async fn get_part(&self, upload_id: &str, part_no: i32)
    -> MetadataResult<Option<UploadPartRow>>;

    /// Parts of a session created after `created_after`, ordered by part number.
    async fn get_parts(
        &self,
        upload_id: &str,
        created_after: OffsetDateTime,
    ) -> MetadataResult<Vec<UploadPartRow>>;

    /// Delete every part of a session. Returns the number of rows removed.
    async fn delete_upload(&self, upload_id: &str) -> MetadataResult<u64>;

    /// Delete parts created at or before `cutoff`. Returns the number of rows removed.
    async fn delete_parts_created_before(&self, cutoff: OffsetDateTime) -> MetadataResult<u64>;

    /// Bytes uploaded by `user_id` per UTC day, for the `days` days ending on `today`.
    ///
    /// Returns exactly `days` rows in ascending date order; days without
    /// uploads report zero. Usage is accounted when a part is created and is
    /// kept after the part is swept or its session deleted.
    async fn upload_stats(
        &self,
        user_id: i64,
        days: u32,
        today: Date,
    ) -> MetadataResult<Vec<UploadStatsRow>>;
}
