//! Chunk partitioning, content fingerprinting and the upload session model.
//!
//! Everything here is local: no network calls are made by this crate.

mod chunked;
mod digest;
mod fingerprint;
mod format;
mod hasher;
mod progress;
mod types;
mod validation;

pub use chunked::{chunk_count, partition, read_chunk};
pub use digest::{ContentHasher, DigestAlgorithm, checksum_bytes};
pub use fingerprint::{FingerprintPool, FingerprintTask, worker_ranges};
pub use format::format_size;
pub use hasher::{FileDigest, FileHasher};
pub use progress::SpeedCalculator;
pub use types::{Chunk, ChunkRange, UploadSession};
pub use validation::validate_file_name;

use chunkup_protocol::UploadState;

pub use chunkup_protocol::constants::DEFAULT_CHUNK_SIZE;

/// Default read window of the whole-file hasher: 2 MiB.
///
/// Independent of the chunk size; only bounds the hasher's memory.
pub const DEFAULT_READ_WINDOW: usize = 2 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to read file: {0}")]
    FileRead(#[source] std::io::Error),

    #[error("failed to read chunks {start}..{end}: {source}")]
    ChunkRead {
        start: u32,
        end: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: UploadState, to: UploadState },
}
