//! Test fixtures for generating test data.

use bytes::Bytes;
use ferry_metadata::{BotRow, ChannelRow, MetadataStore, SessionRow, UploadPartRow};
use ferry_server::auth::hash_token;
use time::OffsetDateTime;

/// Generate deterministic test data based on a seed.
#[allow(dead_code)]
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// A ledger row for `upload_id`/`part_no` created at `created_at`.
#[allow(dead_code)]
pub fn part_row(upload_id: &str, part_no: i32, created_at: OffsetDateTime) -> UploadPartRow {
    UploadPartRow {
        upload_id: upload_id.to_string(),
        part_no,
        name: format!("{upload_id}.part.{part_no}"),
        channel_id: 100,
        part_id: 1000 + i64::from(part_no),
        size: 1024,
        user_id: 1,
        encrypted: false,
        salt: None,
        created_at,
    }
}

/// Store a session for `token` belonging to `user_id`.
#[allow(dead_code)]
pub async fn seed_session(
    store: &dyn MetadataStore,
    token: &str,
    user_id: i64,
    transport_session: &str,
) {
    store
        .create_session(&SessionRow {
            session_hash: hash_token(token),
            user_id,
            transport_session: transport_session.to_string(),
            created_at: OffsetDateTime::now_utc(),
            expires_at: None,
        })
        .await
        .expect("Failed to create session");
}

#[allow(dead_code)]
pub async fn seed_channel(store: &dyn MetadataStore, user_id: i64, channel_id: i64, is_default: bool) {
    store
        .upsert_channel(&ChannelRow {
            user_id,
            channel_id,
            channel_name: format!("channel-{channel_id}"),
            is_default,
            created_at: OffsetDateTime::now_utc(),
        })
        .await
        .expect("Failed to create channel");
}

#[allow(dead_code)]
pub async fn seed_bot(store: &dyn MetadataStore, user_id: i64, channel_id: i64, token: &str) {
    store
        .add_bot(&BotRow {
            user_id,
            channel_id,
            token: token.to_string(),
            created_at: OffsetDateTime::now_utc(),
        })
        .await
        .expect("Failed to add bot");
}
