use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Content hash algorithm used for file identifiers and chunk hashes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// MD5, the backend's native file identifier.
    #[default]
    Md5,
    Sha256,
}

impl DigestAlgorithm {
    /// Creates a fresh accumulator.
    pub fn hasher(self) -> ContentHasher {
        match self {
            Self::Md5 => ContentHasher::Md5(md5::Md5::new()),
            Self::Sha256 => ContentHasher::Sha256(Sha256::new()),
        }
    }
}

/// An incremental hash accumulator.
///
/// Consumed by [`finalize_hex`](Self::finalize_hex), so one value can
/// never hash two inputs.
pub enum ContentHasher {
    Md5(md5::Md5),
    Sha256(Sha256),
}

impl ContentHasher {
    /// Appends bytes to the accumulator.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
        }
    }

    /// Finalizes and returns the lowercase hex digest.
    pub fn finalize_hex(self) -> String {
        match self {
            Self::Md5(h) => hex::encode(h.finalize()),
            Self::Sha256(h) => hex::encode(h.finalize()),
        }
    }
}

/// Hashes `data` in one shot and returns the hex digest.
pub fn checksum_bytes(algorithm: DigestAlgorithm, data: &[u8]) -> String {
    let mut hasher = algorithm.hasher();
    hasher.update(data);
    hasher.finalize_hex()
}
