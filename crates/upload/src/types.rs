//! Data types for the upload flow.

use chunkup_protocol::UploadState;

/// Event emitted while uploading.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// The session entered a new state.
    StateChanged { file: String, state: UploadState },
    /// Progress update. `progress` is in `[0.0, 1.0]` and never decreases.
    Progress {
        file: String,
        progress: f64,
        uploaded_bytes: u64,
        total_bytes: u64,
        bytes_per_second: f64,
        /// Estimated seconds left, known once parts are moving.
        eta_secs: Option<u64>,
        status: String,
    },
    /// One part was stored server-side.
    PartUploaded { file: String, part_number: u32 },
    /// The upload finished, by transfer or deduplication.
    Completed { file: String, url: Option<String> },
    /// The upload failed. Sent once per failed file.
    Failed { file: String, error: String },
    /// The backend rejected the credentials; they were cleared.
    LoginRequired { file: String },
}

/// What a successful upload did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    /// Whole-file digest.
    pub file_identifier: String,
    pub file_name: String,
    pub total_size: u64,
    pub chunk_count: u32,
    /// The backend already held the file; nothing was sent.
    pub deduplicated: bool,
    /// Parts sent during this attempt.
    pub parts_uploaded: u32,
    /// Parts the backend already held before this attempt.
    pub parts_reused: u32,
    /// Object url or name reported by the backend.
    pub url: Option<String>,
}

/// Result of a single file upload.
#[derive(Debug, Clone)]
pub struct UploadResult {
    pub file: String,
    pub success: bool,
    pub error: Option<String>,
    pub summary: Option<UploadSummary>,
}
