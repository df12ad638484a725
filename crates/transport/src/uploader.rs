//! Chunked file uploader.
//!
//! A part is sent as one file-bearing message, but the transport only accepts
//! files in fixed-size chunks. The uploader re-chunks the byte stream and
//! saves up to `threads` chunks concurrently before the file is attached.

use crate::call::InputFile;
use crate::client::Client;
use crate::error::{TransportError, TransportResult};
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt, TryStreamExt};
use std::io;

pub struct Uploader {
    client: Client,
    threads: usize,
    chunk_size: usize,
}

impl Uploader {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            threads: 1,
            chunk_size: ferry_core::DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, ferry_core::MAX_CHUNK_SIZE);
        self
    }

    /// Save `stream` as a file named `name` of exactly `size` bytes.
    pub async fn upload<S>(&self, name: &str, size: u64, stream: S) -> TransportResult<InputFile>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        if size == 0 {
            return Err(TransportError::InvalidRequest(
                "cannot upload an empty file".to_string(),
            ));
        }
        let chunk_size = self.chunk_size as u64;
        let total_parts = u32::try_from(size.div_ceil(chunk_size)).map_err(|_| {
            TransportError::InvalidRequest(format!("file of {size} bytes has too many chunks"))
        })?;
        let file_id: i64 = rand::random();

        let written = rechunk(stream, self.chunk_size)
            .enumerate()
            .map(|(index, chunk)| {
                let client = self.client.clone();
                async move {
                    let chunk = chunk?;
                    let len = chunk.len() as u64;
                    let part = u32::try_from(index)
                        .ok()
                        .filter(|part| *part < total_parts)
                        .ok_or(TransportError::SizeMismatch {
                            expected: size,
                            actual: index as u64 * chunk_size + len,
                        })?;
                    client
                        .save_file_part(file_id, part, total_parts, chunk)
                        .await?;
                    Ok::<u64, TransportError>(len)
                }
            })
            .buffer_unordered(self.threads)
            .try_fold(0u64, |total, len| async move { Ok(total + len) })
            .await?;

        if written != size {
            return Err(TransportError::SizeMismatch {
                expected: size,
                actual: written,
            });
        }

        Ok(InputFile {
            file_id,
            parts: total_parts,
            name: name.to_string(),
            size,
        })
    }
}

/// Re-chunk a byte stream into pieces of exactly `chunk_size` bytes, except
/// the last.
fn rechunk<S>(input: S, chunk_size: usize) -> impl Stream<Item = io::Result<Bytes>> + Send
where
    S: Stream<Item = io::Result<Bytes>> + Send + 'static,
{
    async_stream::stream! {
        let mut input = Box::pin(input);
        let mut buf = BytesMut::with_capacity(chunk_size);
        while let Some(chunk) = input.next().await {
            let mut chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err::<Bytes, io::Error>(e);
                    return;
                }
            };
            while !chunk.is_empty() {
                let take = (chunk_size - buf.len()).min(chunk.len());
                buf.extend_from_slice(&chunk.split_to(take));
                if buf.len() == chunk_size {
                    yield Ok(buf.split().freeze());
                }
            }
        }
        if !buf.is_empty() {
            yield Ok(buf.freeze());
        }
    }
}
