//! Tunables of the upload engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use chunkup_protocol::constants::{DEFAULT_CHUNK_SIZE, PART_UPLOAD_TIMEOUT, REQUEST_TIMEOUT};
use chunkup_transfer::{DEFAULT_READ_WINDOW, DigestAlgorithm};

use crate::retry::RetryPolicy;

/// Upload settings, usually embedded as the `[upload]` table of the app config.
///
/// Every field falls back to its default when absent. Durations are
/// milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    /// Chunk size in bytes.
    pub chunk_size: u64,
    /// Parts uploaded at once.
    pub max_concurrent_parts: usize,
    /// Fingerprint workers. `None` uses the hardware concurrency.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_workers: Option<usize>,
    /// Read window of the whole-file hasher, in bytes.
    pub read_window: usize,
    pub algorithm: DigestAlgorithm,
    pub request_timeout_ms: u64,
    pub part_timeout_ms: u64,
    /// Attempts for check, init and merge.
    pub request_max_attempts: u32,
    /// Attempts per part.
    pub part_max_attempts: u32,
    pub retry_backoff_ms: u64,
    /// `1.0` keeps the backoff fixed.
    pub retry_backoff_factor: f64,
    pub max_retry_backoff_ms: u64,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrent_parts: 4,
            hash_workers: None,
            read_window: DEFAULT_READ_WINDOW,
            algorithm: DigestAlgorithm::default(),
            request_timeout_ms: REQUEST_TIMEOUT.as_millis() as u64,
            part_timeout_ms: PART_UPLOAD_TIMEOUT.as_millis() as u64,
            request_max_attempts: 3,
            part_max_attempts: 3,
            retry_backoff_ms: 500,
            retry_backoff_factor: 1.0,
            max_retry_backoff_ms: 10_000,
        }
    }
}

impl UploadSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn part_timeout(&self) -> Duration {
        Duration::from_millis(self.part_timeout_ms)
    }

    /// Parts in flight, never zero.
    pub fn part_concurrency(&self) -> usize {
        self.max_concurrent_parts.max(1)
    }

    /// Retry policy for check, init and merge.
    pub fn request_retry(&self) -> RetryPolicy {
        self.retry_policy(self.request_max_attempts)
    }

    /// Retry policy for part uploads.
    pub fn part_retry(&self) -> RetryPolicy {
        self.retry_policy(self.part_max_attempts)
    }

    fn retry_policy(&self, max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(self.retry_backoff_ms),
            max_delay: Duration::from_millis(self.max_retry_backoff_ms.max(self.retry_backoff_ms)),
            backoff_factor: self.retry_backoff_factor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = UploadSettings::default();
        assert_eq!(s.chunk_size, 20 * 1024 * 1024);
        assert_eq!(s.max_concurrent_parts, 4);
        assert_eq!(s.request_timeout(), Duration::from_secs(20));
        assert_eq!(s.part_timeout(), Duration::from_secs(60));
        assert_eq!(s.part_retry().max_attempts, 3);
        assert_eq!(s.part_retry().delay_for_attempt(2), Duration::from_millis(500));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let s: UploadSettings = toml::from_str(
            r#"
            chunk_size = 1048576
            algorithm = "sha256"
            part_max_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(s.chunk_size, 1024 * 1024);
        assert_eq!(s.algorithm, DigestAlgorithm::Sha256);
        assert_eq!(s.part_max_attempts, 5);
        assert_eq!(s.max_concurrent_parts, 4);
        assert_eq!(s.request_max_attempts, 3);
    }

    #[test]
    fn toml_roundtrip() {
        let s = UploadSettings {
            hash_workers: Some(2),
            max_concurrent_parts: 8,
            ..Default::default()
        };
        let text = toml::to_string_pretty(&s).unwrap();
        let parsed: UploadSettings = toml::from_str(&text).unwrap();
        assert_eq!(parsed, s);
    }

    #[test]
    fn zero_concurrency_is_clamped() {
        let s = UploadSettings {
            max_concurrent_parts: 0,
            ..Default::default()
        };
        assert_eq!(s.part_concurrency(), 1);
    }
}
