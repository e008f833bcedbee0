use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::TransferError;
use crate::digest::DigestAlgorithm;
use crate::types::{Chunk, ChunkRange};

/// Buffer used when streaming a chunk through its hasher.
const HASH_BUFFER_SIZE: usize = 1024 * 1024;

// ---------------------------------------------------------------------------
// Partitioner
// ---------------------------------------------------------------------------

/// Returns `ceil(total_size / chunk_size)`.
pub fn chunk_count(total_size: u64, chunk_size: u64) -> Result<u32, TransferError> {
    if chunk_size == 0 {
        return Err(TransferError::InvalidInput(
            "chunk size must be greater than zero".into(),
        ));
    }
    let count = total_size.div_ceil(chunk_size);
    u32::try_from(count).map_err(|_| {
        TransferError::InvalidInput(format!(
            "{total_size} bytes in chunks of {chunk_size} exceeds the part limit"
        ))
    })
}

/// Splits `[0, total_size)` into contiguous chunks of `chunk_size` bytes.
///
/// The last chunk may be shorter. An empty file yields no chunks.
pub fn partition(total_size: u64, chunk_size: u64) -> Result<Vec<ChunkRange>, TransferError> {
    let count = chunk_count(total_size, chunk_size)?;
    Ok((0..count)
        .map(|index| {
            let start = index as u64 * chunk_size;
            ChunkRange {
                index,
                start,
                end: (start + chunk_size).min(total_size),
            }
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Chunk readers
// ---------------------------------------------------------------------------

/// Reads the raw bytes of one chunk without touching the rest of the file.
pub async fn read_chunk(path: &Path, range: &ChunkRange) -> Result<Vec<u8>, TransferError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(TransferError::FileRead)?;
    file.seek(SeekFrom::Start(range.start))
        .await
        .map_err(TransferError::FileRead)?;
    let mut buf = vec![0u8; range.len() as usize];
    file.read_exact(&mut buf)
        .await
        .map_err(TransferError::FileRead)?;
    Ok(buf)
}

/// Hashes one chunk from an open file with a fresh accumulator.
///
/// Blocking; called from fingerprint workers only.
pub(crate) fn hash_chunk(
    file: &mut std::fs::File,
    range: &ChunkRange,
    algorithm: DigestAlgorithm,
    buf: &mut [u8],
) -> std::io::Result<Chunk> {
    file.seek(SeekFrom::Start(range.start))?;
    let mut hasher = algorithm.hasher();
    let mut remaining = range.len();
    while remaining > 0 {
        let n = (remaining as usize).min(buf.len());
        file.read_exact(&mut buf[..n])?;
        hasher.update(&buf[..n]);
        remaining -= n as u64;
    }
    Ok(Chunk {
        index: range.index,
        start: range.start,
        end: range.end,
        content_hash: hasher.finalize_hex(),
    })
}

/// Allocates the scratch buffer for [`hash_chunk`].
pub(crate) fn hash_buffer(chunk_size: u64) -> Vec<u8> {
    vec![0u8; (chunk_size as usize).clamp(1, HASH_BUFFER_SIZE)]
}
