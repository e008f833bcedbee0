pub mod constants;
pub mod envelope;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use constants::{ResultCode, TaskCode};
pub use envelope::ApiResponse;
pub use messages::{FileEntry, InitUploadRequest, PartSummary, TaskInfo};
pub use types::{UploadProgress, UploadState};
