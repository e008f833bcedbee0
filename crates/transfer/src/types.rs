use std::collections::BTreeSet;

use chunkup_protocol::{UploadProgress, UploadState};

use crate::TransferError;
use crate::chunked::chunk_count;

/// Byte range of one chunk, as produced by the partitioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    /// Zero-based chunk index.
    pub index: u32,
    /// First byte (inclusive).
    pub start: u64,
    /// Last byte (exclusive).
    pub end: u64,
}

impl ChunkRange {
    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Returns `true` if the range covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// 1-based part number used by the backend.
    pub fn part_number(&self) -> u32 {
        self.index + 1
    }
}

/// A fingerprinted chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: u32,
    pub start: u64,
    pub end: u64,
    /// Hex digest of this chunk's bytes alone.
    pub content_hash: String,
}

impl Chunk {
    /// Returns the byte range of this chunk.
    pub fn range(&self) -> ChunkRange {
        ChunkRange {
            index: self.index,
            start: self.start,
            end: self.end,
        }
    }
}

/// Client-side state of one multipart upload.
///
/// Owned by a single controller; mutated through `&mut self` only.
#[derive(Debug, Clone)]
pub struct UploadSession {
    file_identifier: String,
    file_name: String,
    total_size: u64,
    chunk_size: u64,
    chunk_count: u32,
    upload_id: Option<String>,
    present_parts: BTreeSet<u32>,
    state: UploadState,
}

impl UploadSession {
    /// Creates a session in the `Checking` state.
    pub fn new(
        file_identifier: impl Into<String>,
        file_name: impl Into<String>,
        total_size: u64,
        chunk_size: u64,
    ) -> Result<Self, TransferError> {
        let chunk_count = chunk_count(total_size, chunk_size)?;
        Ok(Self {
            file_identifier: file_identifier.into(),
            file_name: file_name.into(),
            total_size,
            chunk_size,
            chunk_count,
            upload_id: None,
            present_parts: BTreeSet::new(),
            state: UploadState::Checking,
        })
    }

    /// Moves to `next`, rejecting transitions the state machine forbids.
    pub fn transition(&mut self, next: UploadState) -> Result<(), TransferError> {
        if !self.state.can_transition_to(next) {
            return Err(TransferError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Marks the session aborted and drops the session id.
    ///
    /// No-op if the session already reached a terminal state.
    pub fn abort(&mut self) {
        if !self.state.is_terminal() {
            self.state = UploadState::Aborted;
            self.upload_id = None;
        }
    }

    pub fn set_upload_id(&mut self, upload_id: impl Into<String>) {
        self.upload_id = Some(upload_id.into());
    }

    /// Records a chunk index as stored server-side.
    ///
    /// Returns `false` if the index is out of range or already present.
    pub fn mark_present(&mut self, index: u32) -> bool {
        if index >= self.chunk_count {
            return false;
        }
        self.present_parts.insert(index)
    }

    /// Seeds present parts from the backend's 1-based part numbers.
    ///
    /// Numbers outside `1..=chunk_count` are ignored. Returns how many were accepted.
    pub fn seed_present_parts(&mut self, part_numbers: impl IntoIterator<Item = u32>) -> usize {
        part_numbers
            .into_iter()
            .filter(|&n| n >= 1 && self.mark_present(n - 1))
            .count()
    }

    /// Chunk indices not yet present, ascending.
    pub fn missing_parts(&self) -> Vec<u32> {
        (0..self.chunk_count)
            .filter(|i| !self.present_parts.contains(i))
            .collect()
    }

    /// Returns `true` once every chunk is present.
    pub fn all_parts_present(&self) -> bool {
        self.present_parts.len() == self.chunk_count as usize
    }

    /// Byte range of chunk `index`, if it exists.
    pub fn chunk_range(&self, index: u32) -> Option<ChunkRange> {
        if index >= self.chunk_count {
            return None;
        }
        let start = index as u64 * self.chunk_size;
        let end = (start + self.chunk_size).min(self.total_size);
        Some(ChunkRange { index, start, end })
    }

    /// Bytes covered by present parts.
    pub fn uploaded_bytes(&self) -> u64 {
        self.present_parts
            .iter()
            .filter_map(|&i| self.chunk_range(i))
            .map(|r| r.len())
            .sum()
    }

    /// Returns a progress snapshot.
    pub fn progress(&self) -> UploadProgress {
        UploadProgress {
            file_identifier: self.file_identifier.clone(),
            state: self.state,
            total_bytes: self.total_size,
            uploaded_bytes: self.uploaded_bytes(),
            chunk_count: self.chunk_count,
            present_parts: self.present_parts.len() as u32,
        }
    }

    pub fn file_identifier(&self) -> &str {
        &self.file_identifier
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn chunk_count(&self) -> u32 {
        self.chunk_count
    }

    pub fn upload_id(&self) -> Option<&str> {
        self.upload_id.as_deref()
    }

    pub fn present_parts(&self) -> &BTreeSet<u32> {
        &self.present_parts
    }

    pub fn state(&self) -> UploadState {
        self.state
    }
}
