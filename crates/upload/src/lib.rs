//! Resumable chunked upload engine.
//!
//! This crate holds the **business logic** of an upload: it has no UI and
//! talks to the server only through an [`UploadBackend`]. [`HttpBackend`]
//! is the production implementation over `chunkup-client`.
//!
//! # Pipeline
//!
//! 1. **Fingerprint**: whole-file digest plus per-chunk digests
//! 2. **Check**: instant upload when the content is already stored
//! 3. **Init**: open or reuse a multipart session
//! 4. **Upload**: send only the missing parts, in parallel, with retries
//! 5. **Merge**: assemble the parts into the final object
//!
//! [`FileService`] covers the calls outside the pipeline: listing and
//! deleting stored files, and the one-request upload.

pub mod backend;
pub mod controller;
pub mod error;
pub mod files;
pub mod orchestrator;
pub mod retry;
pub mod settings;
pub mod types;

#[cfg(test)]
mod testing;

pub use backend::{BackendFuture, HttpBackend, PartUpload, UploadBackend};
pub use controller::UploadController;
pub use error::UploadError;
pub use files::FileService;
pub use orchestrator::UploadOrchestrator;
pub use retry::RetryPolicy;
pub use settings::UploadSettings;
pub use types::{UploadEvent, UploadResult, UploadSummary};
