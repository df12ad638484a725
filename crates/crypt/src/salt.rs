//! Per-part salt generation.

use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Draw a fresh salt: 32 random bytes, hashed with SHA-256 and encoded as
/// unpadded URL-safe base64 (43 characters).
pub fn generate_salt() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    let digest = Sha256::digest(bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}
