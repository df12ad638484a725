//! Retention sweep of the upload ledger.
//!
//! Only ledger rows are removed. Remote messages of expired uploads are left
//! to whoever owns their cleanup.

use crate::cache::LookupCache;
use crate::metrics::LEDGER_ROWS_SWEPT;
use crate::state::AppState;
use ferry_metadata::{MetadataResult, UploadRepo};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

/// Delete every ledger row outside the retention window as of `now`.
pub async fn run_sweep_once(state: &AppState, now: OffsetDateTime) -> MetadataResult<u64> {
    let cutoff = state.retention_cutoff(now);
    let swept = state.metadata.delete_parts_created_before(cutoff).await?;
    if swept > 0 {
        LEDGER_ROWS_SWEPT.inc_by(swept);
        tracing::info!(swept, cutoff = %cutoff, "swept expired ledger rows");
    }
    Ok(swept)
}

/// Spawn the periodic sweep. Expired lookup cache entries are dropped on the
/// same tick.
pub fn spawn(state: AppState, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if let Err(e) = run_sweep_once(&state, OffsetDateTime::now_utc()).await {
                tracing::error!(error = %e, "retention sweep failed");
            }
            evict_lookups(&state.lookups);
        }
    })
}

fn evict_lookups(lookups: &Arc<LookupCache>) {
    let evicted = lookups.cleanup();
    if evicted > 0 {
        tracing::debug!(evicted, "evicted expired lookup cache entries");
    }
}
