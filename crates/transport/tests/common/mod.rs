pub mod mocks;

#[allow(unused_imports)]
pub use mocks::{ScriptedInvoker, SlowConnector};

use bytes::Bytes;
use ferry_transport::Identity;

/// Identity of an interactive user.
#[allow(dead_code)]
pub fn user(user_id: i64) -> Identity {
    Identity::User {
        user_id,
        session: format!("session-{user_id}"),
    }
}

/// Identity of a delegated bot.
#[allow(dead_code)]
pub fn bot(bot_id: i64) -> Identity {
    Identity::Delegated {
        token: format!("{bot_id}:token"),
    }
}

/// Deterministic test payload.
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
