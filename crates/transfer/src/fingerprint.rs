//! Parallel per-chunk fingerprinting.
//!
//! The chunk index space is split into one contiguous sub-range per worker.
//! Each worker runs on a blocking thread with its own file handle, hashes its
//! chunks with one fresh accumulator per chunk, and hands back an ordered list.
//! The coordinator joins every worker before it assembles the final array, so
//! nothing is published unless all sub-ranges succeeded.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::TransferError;
use crate::chunked::{chunk_count, hash_buffer, hash_chunk};
use crate::digest::DigestAlgorithm;
use crate::types::{Chunk, ChunkRange};

/// Worker count used when the platform cannot report its parallelism.
const FALLBACK_PARALLELISM: usize = 4;

/// Work descriptor handed to one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintTask {
    pub file: PathBuf,
    pub total_size: u64,
    pub chunk_size: u64,
    /// First chunk index (inclusive).
    pub start_chunk_index: u32,
    /// Last chunk index (exclusive).
    pub end_chunk_index: u32,
    pub algorithm: DigestAlgorithm,
}

impl FingerprintTask {
    /// Runs the task on the current thread.
    ///
    /// Returns this sub-range's chunks ordered by index.
    pub fn run(&self) -> std::io::Result<Vec<Chunk>> {
        let mut file = std::fs::File::open(&self.file)?;
        let mut buf = hash_buffer(self.chunk_size);
        (self.start_chunk_index..self.end_chunk_index)
            .map(|index| {
                let start = index as u64 * self.chunk_size;
                let range = ChunkRange {
                    index,
                    start,
                    end: (start + self.chunk_size).min(self.total_size),
                };
                hash_chunk(&mut file, &range, self.algorithm, &mut buf)
            })
            .collect()
    }
}

/// Splits `[0, chunk_count)` into at most `workers` contiguous ranges.
///
/// Range `k` is `[k*ceil(n/T), min((k+1)*ceil(n/T), n))`; empty trailing
/// ranges are dropped.
pub fn worker_ranges(chunk_count: u32, workers: usize) -> Vec<(u32, u32)> {
    if chunk_count == 0 {
        return Vec::new();
    }
    let workers = workers.clamp(1, chunk_count as usize) as u32;
    let per_worker = chunk_count.div_ceil(workers);
    (0..workers)
        .map(|k| {
            let start = k * per_worker;
            (start, ((k + 1) * per_worker).min(chunk_count))
        })
        .filter(|(start, end)| start < end)
        .collect()
}

/// Fingerprints every chunk of a file on a set of blocking workers.
///
/// Workers are spawned per call and torn down when the call returns.
#[derive(Debug, Clone)]
pub struct FingerprintPool {
    parallelism: usize,
    algorithm: DigestAlgorithm,
}

impl FingerprintPool {
    /// Creates a pool.
    ///
    /// `parallelism` of `None` or `0` uses the detected hardware concurrency.
    pub fn new(parallelism: Option<usize>, algorithm: DigestAlgorithm) -> Self {
        let parallelism = parallelism.filter(|&p| p > 0).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(FALLBACK_PARALLELISM)
        });
        Self {
            parallelism,
            algorithm,
        }
    }

    /// Number of workers spawned for `chunk_count` chunks. Never zero.
    pub fn worker_count(&self, chunk_count: u32) -> usize {
        self.parallelism.min(chunk_count as usize).max(1)
    }

    /// Fingerprints every chunk of `path`, ordered by index.
    ///
    /// Fails with [`TransferError::ChunkRead`] naming the first failed
    /// worker's index range.
    pub async fn fingerprint(
        &self,
        path: &Path,
        total_size: u64,
        chunk_size: u64,
    ) -> Result<Vec<Chunk>, TransferError> {
        let count = chunk_count(total_size, chunk_size)?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let ranges = worker_ranges(count, self.worker_count(count));
        debug!(
            chunks = count,
            workers = ranges.len(),
            algorithm = ?self.algorithm,
            "fingerprinting chunks"
        );

        let handles: Vec<_> = ranges
            .into_iter()
            .map(|(start, end)| {
                let task = FingerprintTask {
                    file: path.to_path_buf(),
                    total_size,
                    chunk_size,
                    start_chunk_index: start,
                    end_chunk_index: end,
                    algorithm: self.algorithm,
                };
                (start, end, tokio::task::spawn_blocking(move || task.run()))
            })
            .collect();

        // Join every worker before deciding, so no thread outlives the call.
        let mut slots: Vec<Option<Chunk>> = vec![None; count as usize];
        let mut failure = None;
        for (start, end, handle) in handles {
            let outcome = match handle.await {
                Ok(result) => result,
                Err(e) => Err(std::io::Error::other(format!("fingerprint worker failed: {e}"))),
            };
            match outcome {
                Ok(chunks) => {
                    for chunk in chunks {
                        let slot = chunk.index as usize;
                        slots[slot] = Some(chunk);
                    }
                }
                Err(source) => {
                    debug!(start, end, error = %source, "fingerprint worker failed");
                    failure.get_or_insert(TransferError::ChunkRead { start, end, source });
                }
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }

        slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| TransferError::ChunkRead {
                start: 0,
                end: count,
                source: std::io::Error::other("fingerprint workers returned incomplete results"),
            })
    }
}
