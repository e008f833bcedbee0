//! Backend abstraction and its HTTP implementation.
//!
//! The controller talks to an `UploadBackend` so that the state machine can
//! be driven by mocks in tests and by [`HttpBackend`] in production.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use chunkup_client::{ApiClient, MultipartBody};
use chunkup_protocol::constants::{
    CHECK_PATH, DEFAULT_API_PREFIX, INIT_PATH, MERGE_PATH, PART_UPLOAD_TIMEOUT, UPLOAD_PART_PATH,
};
use chunkup_protocol::messages::UploadPartFields;
use chunkup_protocol::{InitUploadRequest, TaskInfo};

use crate::error::UploadError;

/// Boxed future returned by [`UploadBackend`] methods.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, UploadError>> + Send + 'a>>;

/// One part ready to send.
#[derive(Debug, Clone)]
pub struct PartUpload {
    pub fields: UploadPartFields,
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Digest of `bytes`, from the fingerprint pool.
    pub content_hash: String,
}

/// The multipart upload API.
pub trait UploadBackend: Send + Sync {
    /// Asks whether content with `file_hash` is stored, in progress, or unknown.
    fn check<'a>(&'a self, file_hash: &'a str, cancel: &'a CancellationToken)
    -> BackendFuture<'a, TaskInfo>;

    /// Opens (or reuses) a session and returns its upload id.
    fn init<'a>(
        &'a self,
        request: &'a InitUploadRequest,
        cancel: &'a CancellationToken,
    ) -> BackendFuture<'a, String>;

    /// Stores one part.
    fn upload_part<'a>(
        &'a self,
        part: PartUpload,
        cancel: &'a CancellationToken,
    ) -> BackendFuture<'a, ()>;

    /// Assembles the parts. Returns the object url or name when the backend
    /// reports one.
    fn merge<'a>(
        &'a self,
        file_hash: &'a str,
        cancel: &'a CancellationToken,
    ) -> BackendFuture<'a, Option<String>>;
}

/// [`UploadBackend`] over the HTTP API.
pub struct HttpBackend {
    client: ApiClient,
    prefix: String,
    part_timeout: Duration,
}

impl HttpBackend {
    /// Creates a backend using the default route prefix.
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            prefix: DEFAULT_API_PREFIX.to_string(),
            part_timeout: PART_UPLOAD_TIMEOUT,
        }
    }

    /// Overrides the route prefix (`/bunUpload/multipart` by default).
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_part_timeout(mut self, timeout: Duration) -> Self {
        self.part_timeout = timeout;
        self
    }

    fn path(&self, route: &str) -> String {
        format!("{}{}", self.prefix, route)
    }
}

impl UploadBackend for HttpBackend {
    fn check<'a>(
        &'a self,
        file_hash: &'a str,
        cancel: &'a CancellationToken,
    ) -> BackendFuture<'a, TaskInfo> {
        Box::pin(async move {
            let path = format!("{}/{file_hash}", self.path(CHECK_PATH));
            let resp = self.client.get(&path, &[], cancel).await?;
            resp.parse_data::<TaskInfo>()?
                .ok_or_else(|| UploadError::Protocol("empty check response".into()))
        })
    }

    fn init<'a>(
        &'a self,
        request: &'a InitUploadRequest,
        cancel: &'a CancellationToken,
    ) -> BackendFuture<'a, String> {
        Box::pin(async move {
            let resp = self
                .client
                .post_json(&self.path(INIT_PATH), Some(request), cancel)
                .await?;
            resp.parse_data::<String>()?
                .filter(|id| !id.trim().is_empty())
                .ok_or_else(|| UploadError::Protocol("init response carried no upload id".into()))
        })
    }

    fn upload_part<'a>(
        &'a self,
        part: PartUpload,
        cancel: &'a CancellationToken,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let body = MultipartBody::new(part.file_name, part.bytes, part.content_hash)
                .text("uploadId", part.fields.upload_id)
                .text("partNumber", part.fields.part_number.to_string());
            self.client
                .post_multipart(&self.path(UPLOAD_PART_PATH), body, self.part_timeout, cancel)
                .await?;
            Ok(())
        })
    }

    fn merge<'a>(
        &'a self,
        file_hash: &'a str,
        cancel: &'a CancellationToken,
    ) -> BackendFuture<'a, Option<String>> {
        Box::pin(async move {
            let path = format!("{}/{file_hash}", self.path(MERGE_PATH));
            let resp = self.client.post_json::<Value>(&path, None, cancel).await?;
            Ok(object_ref(resp.data.as_ref()))
        })
    }
}

/// Extracts the object reference from a merge payload.
///
/// Accepts a bare string or an object with `url` or `objectName`.
pub(crate) fn object_ref(data: Option<&Value>) -> Option<String> {
    match data? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => ["url", "objectName"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str))
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{mock_server, request_line};
    use chunkup_client::{CredentialStore, MemoryCredentialStore};
    use chunkup_protocol::TaskCode;
    use serde_json::json;
    use std::sync::Arc;

    fn backend(url: &str) -> HttpBackend {
        let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::with_token("t"));
        HttpBackend::new(ApiClient::new(url, store).unwrap())
    }

    #[tokio::test]
    async fn check_parses_task_info() {
        let (url, mut lines, handle) = mock_server(vec![
            r#"{"code":200,"data":{"code":2002,"uploadId":"u-9","exitPartList":[{"partNumber":1},{"partNumber":3}]}}"#,
        ])
        .await;

        let info = backend(&url)
            .check("abc", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(info.code, TaskCode::Uploading);
        assert_eq!(info.upload_id(), Some("u-9"));
        assert_eq!(info.present_part_numbers(), vec![1, 3]);
        assert_eq!(
            request_line(&mut lines).await,
            "GET /bunUpload/multipart/check/abc HTTP/1.1"
        );

        handle.abort();
    }

    #[tokio::test]
    async fn check_without_data_is_protocol_error() {
        let (url, _lines, handle) = mock_server(vec![r#"{"code":200}"#]).await;
        let err = backend(&url)
            .check("abc", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Protocol(_)));
        handle.abort();
    }

    #[tokio::test]
    async fn init_returns_upload_id() {
        let (url, mut lines, handle) =
            mock_server(vec![r#"{"code":200,"data":"upload-42"}"#]).await;
        let request = InitUploadRequest {
            file_identifier: "abc".into(),
            total_size: 10,
            chunk_num: 1,
            chunk_size: 10,
            file_name: "a.bin".into(),
        };

        let id = backend(&url)
            .init(&request, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(id, "upload-42");
        assert_eq!(
            request_line(&mut lines).await,
            "POST /bunUpload/multipart/init HTTP/1.1"
        );

        handle.abort();
    }

    #[tokio::test]
    async fn init_with_blank_id_is_protocol_error() {
        let (url, _lines, handle) = mock_server(vec![r#"{"code":200,"data":""}"#]).await;
        let request = InitUploadRequest {
            file_identifier: "abc".into(),
            total_size: 10,
            chunk_num: 1,
            chunk_size: 10,
            file_name: "a.bin".into(),
        };
        let err = backend(&url)
            .init(&request, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Protocol(_)));
        handle.abort();
    }

    #[tokio::test]
    async fn merge_twice_succeeds_both_times() {
        let (url, mut lines, handle) = mock_server(vec![
            r#"{"code":200,"data":"https://cdn/obj"}"#,
            r#"{"code":200,"data":"https://cdn/obj"}"#,
        ])
        .await;
        let backend = backend(&url).with_prefix("/api/");
        let cancel = CancellationToken::new();

        for _ in 0..2 {
            let url = backend.merge("abc", &cancel).await.unwrap();
            assert_eq!(url.as_deref(), Some("https://cdn/obj"));
            assert_eq!(request_line(&mut lines).await, "POST /api/merge/abc HTTP/1.1");
        }

        handle.abort();
    }

    #[test]
    fn object_ref_shapes() {
        assert_eq!(object_ref(Some(&json!("a/b.bin"))).as_deref(), Some("a/b.bin"));
        assert_eq!(
            object_ref(Some(&json!({"objectName": "x", "url": "u"}))).as_deref(),
            Some("u")
        );
        assert_eq!(
            object_ref(Some(&json!({"objectName": "x"}))).as_deref(),
            Some("x")
        );
        assert_eq!(object_ref(Some(&json!(""))), None);
        assert_eq!(object_ref(Some(&Value::Null)), None);
        assert_eq!(object_ref(None), None);
    }
}
