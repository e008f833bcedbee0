//! Stored-file management and the non-chunked upload.
//!
//! These calls live beside the multipart API under the service prefix
//! (`/bunUpload` by default) and share its envelope and credentials.

use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use chunkup_client::{ApiClient, MultipartBody};
use chunkup_protocol::FileEntry;
use chunkup_protocol::constants::{
    DEFAULT_SERVICE_PREFIX, FILES_PATH, PART_UPLOAD_TIMEOUT, SINGLE_UPLOAD_PATH,
};
use chunkup_transfer::{DigestAlgorithm, TransferError, checksum_bytes, validate_file_name};

use crate::backend::object_ref;
use crate::controller::file_name_of;
use crate::error::UploadError;

/// Lists, deletes and uploads whole files.
pub struct FileService {
    client: ApiClient,
    prefix: String,
    upload_timeout: Duration,
}

impl FileService {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            prefix: DEFAULT_SERVICE_PREFIX.to_string(),
            upload_timeout: PART_UPLOAD_TIMEOUT,
        }
    }

    /// Overrides the route prefix (`/bunUpload` by default).
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }

    fn path(&self, route: &str) -> String {
        format!("{}{}", self.prefix, route)
    }

    /// Lists stored files, optionally filtered by a name fragment.
    ///
    /// A blank `name` lists everything.
    pub async fn list_files(
        &self,
        name: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<FileEntry>, UploadError> {
        let query: Vec<(&str, &str)> = name
            .filter(|n| !n.trim().is_empty())
            .map(|n| vec![("fileName", n)])
            .unwrap_or_default();
        let resp = self.client.get(&self.path(FILES_PATH), &query, cancel).await?;
        Ok(resp.parse_data::<Vec<FileEntry>>()?.unwrap_or_default())
    }

    /// Deletes the stored file with `id`.
    pub async fn delete_file(&self, id: i64, cancel: &CancellationToken) -> Result<(), UploadError> {
        let path = format!("{}/{id}", self.path(FILES_PATH));
        self.client.delete(&path, cancel).await?;
        info!(id, "file deleted");
        Ok(())
    }

    /// Uploads `path` in one multipart request with no dedup check.
    ///
    /// Returns the gateway url when the backend reports one.
    pub async fn single_upload(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, UploadError> {
        let file_name = file_name_of(path)?;
        validate_file_name(&file_name)?;
        let bytes = tokio::fs::read(path).await.map_err(TransferError::FileRead)?;
        let size = bytes.len();
        let digest = checksum_bytes(DigestAlgorithm::Md5, &bytes);

        let body = MultipartBody::new(file_name.clone(), bytes, digest);
        let resp = self
            .client
            .post_multipart(&self.path(SINGLE_UPLOAD_PATH), body, self.upload_timeout, cancel)
            .await?;
        let url = object_ref(resp.data.as_ref());
        info!(file = %file_name, size, url = ?url, "single upload completed");
        Ok(url)
    }
}
