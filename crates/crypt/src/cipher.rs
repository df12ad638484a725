//! Streaming block cipher for upload parts.
//!
//! Ciphertext layout:
//!
//! ```text
//! magic (8) | base nonce (24) | block 0 | block 1 | ...
//! ```
//!
//! Every block seals up to [`BLOCK_SIZE`] plaintext bytes with
//! XChaCha20-Poly1305 under the base nonce advanced by the block index, and
//! carries a [`TAG_SIZE`] byte authentication tag. Only the final block may be
//! short, so the ciphertext length is a pure function of the plaintext length.
//!
//! The final block is sealed with distinct associated data. A stream always
//! ends with one, even for an empty plaintext, so a ciphertext cut at a block
//! boundary or extended past its end fails to decrypt.

use crate::error::{CryptError, CryptResult};
use bytes::{Bytes, BytesMut};
use chacha20poly1305::{
    Key, XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use futures::{Stream, StreamExt};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io;
use std::pin::Pin;

/// Boxed byte stream consumed and produced by the cipher.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

const MAGIC: &[u8; 8] = b"FERRY\x00\x00\x01";
const NONCE_SIZE: usize = 24;
const KEY_DOMAIN: &[u8] = b"ferry-part-key-v1";
const LAST_BLOCK: &[u8] = b"last";

/// Size of the stream header: magic plus base nonce.
pub const HEADER_SIZE: usize = MAGIC.len() + NONCE_SIZE;

/// Plaintext bytes sealed per block: 64 KiB
pub const BLOCK_SIZE: usize = 64 * 1024;

/// Poly1305 tag appended to every block.
pub const TAG_SIZE: usize = 16;

/// Ciphertext length for a plaintext of `plaintext_size` bytes.
pub fn encrypted_size(plaintext_size: u64) -> u64 {
    let blocks = plaintext_size.div_ceil(BLOCK_SIZE as u64).max(1);
    HEADER_SIZE as u64 + plaintext_size + blocks * TAG_SIZE as u64
}

/// Per-part cipher derived from the master key and the part's salt.
#[derive(Clone)]
pub struct Cipher {
    aead: XChaCha20Poly1305,
}

impl Cipher {
    /// Derive a part cipher. The key is SHA-256 over a domain tag, the
    /// length-prefixed master key and the salt.
    pub fn new(master_key: &str, salt: &str) -> CryptResult<Self> {
        if master_key.is_empty() {
            return Err(CryptError::EmptyKey);
        }
        if salt.is_empty() {
            return Err(CryptError::EmptySalt);
        }

        let mut hasher = Sha256::new();
        hasher.update(KEY_DOMAIN);
        hasher.update((master_key.len() as u64).to_be_bytes());
        hasher.update(master_key.as_bytes());
        hasher.update(salt.as_bytes());
        let key = hasher.finalize();

        Ok(Self {
            aead: XChaCha20Poly1305::new(Key::from_slice(&key)),
        })
    }

    /// Encrypt a plaintext stream.
    ///
    /// At most one block of plaintext is buffered. The output yields exactly
    /// [`encrypted_size`] bytes for the plaintext consumed.
    pub fn encrypt<S>(self, input: S) -> ByteStream
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        let mut base = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut base);

        Box::pin(async_stream::stream! {
            let mut header = BytesMut::with_capacity(HEADER_SIZE);
            header.extend_from_slice(MAGIC);
            header.extend_from_slice(&base);
            yield Ok::<Bytes, io::Error>(header.freeze());

            let mut input = Box::pin(input);
            let mut block = BytesMut::with_capacity(BLOCK_SIZE);
            let mut index = 0u64;

            while let Some(chunk) = input.next().await {
                let mut chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                while !chunk.is_empty() {
                    // A full block is only sealed once more plaintext shows it is not the last.
                    if block.len() == BLOCK_SIZE {
                        match self.seal(&base, index, &block, false) {
                            Ok(sealed) => yield Ok(sealed),
                            Err(e) => {
                                yield Err(e.into());
                                return;
                            }
                        }
                        block.clear();
                        index += 1;
                    }
                    let take = (BLOCK_SIZE - block.len()).min(chunk.len());
                    block.extend_from_slice(&chunk.split_to(take));
                }
            }

            match self.seal(&base, index, &block, true) {
                Ok(sealed) => yield Ok(sealed),
                Err(e) => yield Err(e.into()),
            }
        })
    }

    /// Decrypt a stream produced by [`Cipher::encrypt`].
    pub fn decrypt<S>(self, input: S) -> ByteStream
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        const SEALED_BLOCK: usize = BLOCK_SIZE + TAG_SIZE;

        Box::pin(async_stream::stream! {
            let mut input = Box::pin(input);
            let mut buf = BytesMut::new();
            let mut base: Option<[u8; NONCE_SIZE]> = None;
            let mut index = 0u64;
            let mut done = false;

            while !done {
                match input.next().await {
                    Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        yield Err::<Bytes, io::Error>(e);
                        return;
                    }
                    None => done = true,
                }

                if base.is_none() {
                    if buf.len() < HEADER_SIZE {
                        if done {
                            yield Err(CryptError::Truncated("missing header".to_string()).into());
                        }
                        continue;
                    }
                    let header = buf.split_to(HEADER_SIZE);
                    match parse_header(&header) {
                        Ok(nonce) => base = Some(nonce),
                        Err(e) => {
                            yield Err(e.into());
                            return;
                        }
                    }
                }
                let Some(nonce) = base else { continue };

                // A block followed by more bytes is never the last one.
                while buf.len() > SEALED_BLOCK {
                    let sealed = buf.split_to(SEALED_BLOCK);
                    match self.open(&nonce, index, &sealed, false) {
                        Ok(plain) => yield Ok(plain),
                        Err(e) => {
                            yield Err(e.into());
                            return;
                        }
                    }
                    index += 1;
                }

                if done {
                    let sealed = buf.split();
                    match self.open(&nonce, index, &sealed, true) {
                        Ok(plain) if plain.is_empty() => {}
                        Ok(plain) => yield Ok(plain),
                        Err(e) => yield Err(e.into()),
                    }
                }
            }
        })
    }

    fn seal(
        &self,
        base: &[u8; NONCE_SIZE],
        index: u64,
        block: &[u8],
        last: bool,
    ) -> CryptResult<Bytes> {
        let nonce = block_nonce(base, index);
        let payload = Payload {
            msg: block,
            aad: block_aad(last),
        };
        self.aead
            .encrypt(&nonce, payload)
            .map(Bytes::from)
            .map_err(|_| CryptError::EncryptFailed)
    }

    fn open(
        &self,
        base: &[u8; NONCE_SIZE],
        index: u64,
        sealed: &[u8],
        last: bool,
    ) -> CryptResult<Bytes> {
        if sealed.len() < TAG_SIZE {
            return Err(CryptError::Truncated(format!(
                "block {index} is {} bytes",
                sealed.len()
            )));
        }
        let nonce = block_nonce(base, index);
        let payload = Payload {
            msg: sealed,
            aad: block_aad(last),
        };
        self.aead
            .decrypt(&nonce, payload)
            .map(Bytes::from)
            .map_err(|_| CryptError::DecryptFailed(index))
    }
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cipher([REDACTED])")
    }
}

fn parse_header(header: &[u8]) -> CryptResult<[u8; NONCE_SIZE]> {
    if &header[..MAGIC.len()] != MAGIC {
        return Err(CryptError::InvalidHeader("bad magic".to_string()));
    }
    header[MAGIC.len()..HEADER_SIZE]
        .try_into()
        .map_err(|_| CryptError::InvalidHeader("bad nonce".to_string()))
}

fn block_aad(last: bool) -> &'static [u8] {
    if last { LAST_BLOCK } else { &[] }
}

/// Base nonce plus block index, as a little-endian 192-bit addition.
fn block_nonce(base: &[u8; NONCE_SIZE], index: u64) -> XNonce {
    let mut nonce = *base;
    let mut carry = index as u128;
    for byte in nonce.iter_mut() {
        if carry == 0 {
            break;
        }
        let sum = *byte as u128 + (carry & 0xff);
        *byte = sum as u8;
        carry = (carry >> 8) + (sum >> 8);
    }
    XNonce::clone_from_slice(&nonce)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn chunked(data: Vec<u8>, chunk: usize) -> impl Stream<Item = io::Result<Bytes>> + Send {
        let chunks: Vec<io::Result<Bytes>> = data
            .chunks(chunk)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        futures::stream::iter(chunks)
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    async fn collect(stream: ByteStream) -> io::Result<Vec<u8>> {
        let parts: Vec<Bytes> = stream.try_collect().await?;
        Ok(parts.concat())
    }

    #[test]
    fn test_encrypted_size_is_header_plus_tags() {
        // An empty plaintext still carries the sealed final block.
        assert_eq!(encrypted_size(0), 32 + 16);
        assert_eq!(encrypted_size(1), 32 + 1 + 16);
        assert_eq!(encrypted_size(BLOCK_SIZE as u64), 32 + 65536 + 16);
        assert_eq!(encrypted_size(BLOCK_SIZE as u64 + 1), 32 + 65537 + 32);
        // 1,000,000 bytes span 16 blocks
        assert_eq!(encrypted_size(1_000_000), 32 + 1_000_000 + 16 * 16);
    }

    #[tokio::test]
    async fn test_encrypted_length_matches_declared_size() {
        for len in [0usize, 1, 1000, BLOCK_SIZE - 1, BLOCK_SIZE, BLOCK_SIZE * 3 + 7, 1_000_000] {
            let cipher = Cipher::new("master", "salt").unwrap();
            let out = collect(cipher.encrypt(chunked(payload(len), 10_000)))
                .await
                .unwrap();
            assert_eq!(out.len() as u64, encrypted_size(len as u64), "len={len}");
        }
    }

    #[tokio::test]
    async fn test_round_trip_with_irregular_chunks() {
        let data = payload(BLOCK_SIZE * 2 + 12_345);
        let cipher = Cipher::new("master", "salt-1").unwrap();
        let sealed = collect(cipher.clone().encrypt(chunked(data.clone(), 7_777)))
            .await
            .unwrap();
        let opened = collect(cipher.decrypt(chunked(sealed, 4_096))).await.unwrap();
        assert_eq!(opened, data);
    }

    #[tokio::test]
    async fn test_round_trip_exact_block_multiple() {
        let data = payload(BLOCK_SIZE * 2);
        let cipher = Cipher::new("master", "salt-1").unwrap();
        let sealed = collect(cipher.clone().encrypt(chunked(data.clone(), BLOCK_SIZE)))
            .await
            .unwrap();
        let opened = collect(cipher.decrypt(chunked(sealed, BLOCK_SIZE + TAG_SIZE)))
            .await
            .unwrap();
        assert_eq!(opened, data);
    }

    #[tokio::test]
    async fn test_wrong_salt_fails_to_decrypt() {
        let data = payload(5000);
        let sealed = collect(
            Cipher::new("master", "salt-a")
                .unwrap()
                .encrypt(chunked(data, 5000)),
        )
        .await
        .unwrap();
        let result = collect(
            Cipher::new("master", "salt-b")
                .unwrap()
                .decrypt(chunked(sealed, 5000)),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_tampered_block_is_rejected() {
        let cipher = Cipher::new("master", "salt").unwrap();
        let mut sealed = collect(cipher.clone().encrypt(chunked(payload(3000), 3000)))
            .await
            .unwrap();
        sealed[HEADER_SIZE + 10] ^= 0x01;
        assert!(collect(cipher.decrypt(chunked(sealed, 1024))).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_plaintext_round_trips() {
        let cipher = Cipher::new("master", "salt").unwrap();
        let sealed = collect(cipher.clone().encrypt(chunked(Vec::new(), 1)))
            .await
            .unwrap();
        assert_eq!(sealed.len(), HEADER_SIZE + TAG_SIZE);
        let opened = collect(cipher.decrypt(chunked(sealed, 7))).await.unwrap();
        assert!(opened.is_empty());
    }

    #[tokio::test]
    async fn test_ciphertext_cut_at_block_boundary_is_rejected() {
        let data = payload(BLOCK_SIZE * 3);
        let cipher = Cipher::new("master", "salt").unwrap();
        let sealed = collect(cipher.clone().encrypt(chunked(data, 10_000)))
            .await
            .unwrap();
        assert_eq!(sealed.len() as u64, encrypted_size((BLOCK_SIZE * 3) as u64));

        for blocks in 0..3 {
            let cut = sealed[..HEADER_SIZE + blocks * (BLOCK_SIZE + TAG_SIZE)].to_vec();
            let result = collect(cipher.clone().decrypt(chunked(cut, 4_096))).await;
            assert!(result.is_err(), "stream cut after {blocks} blocks was accepted");
        }
    }

    #[tokio::test]
    async fn test_bytes_after_final_block_are_rejected() {
        let cipher = Cipher::new("master", "salt").unwrap();
        let mut sealed = collect(cipher.clone().encrypt(chunked(payload(BLOCK_SIZE), 5_000)))
            .await
            .unwrap();
        let copy = sealed[HEADER_SIZE..].to_vec();
        sealed.extend_from_slice(&copy);
        assert!(collect(cipher.decrypt(chunked(sealed, 4_096))).await.is_err());
    }

    #[tokio::test]
    async fn test_same_input_encrypts_differently() {
        let cipher = Cipher::new("master", "salt").unwrap();
        let a = collect(cipher.clone().encrypt(chunked(payload(100), 100)))
            .await
            .unwrap();
        let b = collect(cipher.encrypt(chunked(payload(100), 100)))
            .await
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_key_or_salt_rejected() {
        assert!(matches!(Cipher::new("", "salt"), Err(CryptError::EmptyKey)));
        assert!(matches!(Cipher::new("key", ""), Err(CryptError::EmptySalt)));
    }

    #[test]
    fn test_block_nonce_carries() {
        let mut base = [0u8; NONCE_SIZE];
        base[0] = 0xff;
        let nonce = block_nonce(&base, 1);
        assert_eq!(nonce[0], 0);
        assert_eq!(nonce[1], 1);
        assert_eq!(block_nonce(&base, 0).as_slice(), &base);
    }
}
