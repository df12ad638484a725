//! Part encryption for ferry uploads.
//!
//! This crate provides:
//! - A streaming XChaCha20-Poly1305 cipher keyed by a master secret and a per-part salt
//! - Ciphertext size computation ahead of encryption
//! - Salt generation

pub mod cipher;
pub mod error;
pub mod salt;

pub use cipher::{BLOCK_SIZE, ByteStream, Cipher, HEADER_SIZE, TAG_SIZE, encrypted_size};
pub use error::{CryptError, CryptResult};
pub use salt::generate_salt;
