use std::path::Path;

use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::digest::DigestAlgorithm;
use crate::{DEFAULT_READ_WINDOW, TransferError};

/// Digest of a whole file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    /// Lowercase hex digest; used as the file identifier.
    pub hash: String,
    /// Bytes hashed.
    pub size: u64,
}

/// Streams a file through a single accumulator in fixed windows.
///
/// Memory use is one window regardless of file size. The result does not
/// depend on the window size or on how the file is later chunked.
#[derive(Debug, Clone)]
pub struct FileHasher {
    algorithm: DigestAlgorithm,
    window: usize,
}

impl FileHasher {
    /// Creates a hasher. A `window` of 0 uses [`DEFAULT_READ_WINDOW`].
    pub fn new(algorithm: DigestAlgorithm, window: usize) -> Self {
        let window = if window == 0 {
            DEFAULT_READ_WINDOW
        } else {
            window
        };
        Self { algorithm, window }
    }

    /// Hashes the file at `path`, reading its current size first.
    pub async fn hash_file(&self, path: &Path) -> Result<FileDigest, TransferError> {
        let size = tokio::fs::metadata(path)
            .await
            .map_err(TransferError::FileRead)?
            .len();
        self.hash_prefix(path, size).await
    }

    /// Hashes the first `total_size` bytes of `path`, in order.
    ///
    /// Fails if the file holds fewer than `total_size` bytes.
    pub async fn hash_prefix(
        &self,
        path: &Path,
        total_size: u64,
    ) -> Result<FileDigest, TransferError> {
        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(TransferError::FileRead)?;
        let mut hasher = self.algorithm.hasher();
        let mut buf = vec![0u8; self.window];
        let mut offset = 0u64;

        while offset < total_size {
            let n = ((total_size - offset) as usize).min(buf.len());
            file.read_exact(&mut buf[..n])
                .await
                .map_err(TransferError::FileRead)?;
            hasher.update(&buf[..n]);
            offset += n as u64;
        }

        let hash = hasher.finalize_hex();
        debug!(path = %path.display(), size = total_size, %hash, "hashed file");
        Ok(FileDigest {
            hash,
            size: total_size,
        })
    }
}

impl Default for FileHasher {
    fn default() -> Self {
        Self::new(DigestAlgorithm::default(), DEFAULT_READ_WINDOW)
    }
}
