//! HTTP client for the multipart upload API.
//!
//! Wraps `reqwest` with credential headers, per-call timeouts, envelope
//! classification, and a guard that keeps at most one identical request in
//! flight.

pub mod client;
pub mod coalesce;
pub mod credentials;
mod error;

pub use client::{ApiClient, MultipartBody};
pub use coalesce::{RequestCoalescer, request_signature};
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::ClientError;
