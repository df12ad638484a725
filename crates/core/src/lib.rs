//! Core domain types and shared logic for the ferry upload engine.
//!
//! This crate defines the data model used across all other crates:
//! - Upload session identifiers and part numbers
//! - Part descriptors returned to callers
//! - Upload queries and usage statistics
//! - Application configuration

pub mod config;
pub mod error;
pub mod upload;

pub use error::{Error, Result};
pub use upload::{PartNo, UploadId, UploadOut, UploadPartOut, UploadQuery, UploadStats};

/// Default chunk size for the transport uploader: 512 KiB
pub const DEFAULT_CHUNK_SIZE: usize = 512 * 1024;

/// Largest chunk the transport accepts in one save call: 512 KiB
pub const MAX_CHUNK_SIZE: usize = 512 * 1024;

/// Default ceiling on the size of a single uploaded part: 2000 MiB
pub const DEFAULT_MAX_PART_SIZE: u64 = 2000 * 1024 * 1024;

/// Default retention window for ledger rows: 24 hours
pub const DEFAULT_RETENTION_SECS: u64 = 24 * 60 * 60;
