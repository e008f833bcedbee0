//! Async HTTP client for the multipart upload API.
//!
//! Every call goes through the [`RequestCoalescer`], carries the credential
//! headers, and is bounded by a timeout. Responses are unwrapped from the
//! `{code, data, message}` envelope and classified before they reach callers.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT_LANGUAGE, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use chunkup_protocol::constants::REQUEST_TIMEOUT;
use chunkup_protocol::{ApiResponse, ResultCode};

use crate::ClientError;
use crate::coalesce::{RequestCoalescer, request_signature};
use crate::credentials::{CredentialStore, DEFAULT_LANGUAGE, LANGUAGE_KEY, TOKEN_KEY};

/// Multipart form with text fields and one binary file field.
#[derive(Debug, Clone)]
pub struct MultipartBody {
    fields: Vec<(String, String)>,
    file_field: String,
    file_name: String,
    bytes: Vec<u8>,
    digest: String,
}

impl MultipartBody {
    /// Creates a body whose binary field is named `file`.
    ///
    /// `digest` identifies the bytes in the request signature; it is not sent.
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>, digest: impl Into<String>) -> Self {
        Self {
            fields: Vec::new(),
            file_field: "file".into(),
            file_name: file_name.into(),
            bytes,
            digest: digest.into(),
        }
    }

    /// Adds a text field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Text fields plus the binary part's length and digest.
    fn signature_value(&self) -> Value {
        let mut map: serde_json::Map<String, Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        map.insert(
            self.file_field.clone(),
            json!({ "size": self.bytes.len(), "digest": self.digest }),
        );
        Value::Object(map)
    }

    fn into_form(self) -> Form {
        let form = self
            .fields
            .into_iter()
            .fold(Form::new(), |form, (name, value)| form.text(name, value));
        form.part(
            self.file_field,
            Part::bytes(self.bytes).file_name(self.file_name),
        )
    }
}

/// Client for the upload API.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn CredentialStore>,
    coalescer: RequestCoalescer,
    request_timeout: Duration,
}

impl ApiClient {
    /// Creates a client rooted at `base_url` (scheme, host and route prefix).
    pub fn new(
        base_url: impl Into<String>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            coalescer: RequestCoalescer::new(),
            request_timeout: REQUEST_TIMEOUT,
        })
    }

    /// Overrides the timeout of [`get`](Self::get) and [`post_json`](Self::post_json).
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    /// Number of requests currently in flight.
    pub fn in_flight(&self) -> usize {
        self.coalescer.in_flight()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn headers(&self) -> Result<HeaderMap, ClientError> {
        let token = self.credentials.get(TOKEN_KEY).unwrap_or_default();
        let language = self
            .credentials
            .get(LANGUAGE_KEY)
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&token)
                .map_err(|_| ClientError::InvalidHeader("authorization token".into()))?,
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&language)
                .map_err(|_| ClientError::InvalidHeader(format!("language {language:?}")))?,
        );
        Ok(headers)
    }

    /// Sends a GET request and returns the successful envelope.
    pub async fn get(
        &self,
        path: &str,
        query: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, ClientError> {
        let url = self.url(path);
        let query_value = if query.is_empty() {
            Value::Null
        } else {
            Value::Object(
                query
                    .iter()
                    .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                    .collect(),
            )
        };
        let key = request_signature("GET", &url, &query_value, &Value::Null);
        let request = self.http.get(&url).query(query).headers(self.headers()?);
        self.dispatch(key, request, self.request_timeout, cancel)
            .await
    }

    /// Sends a JSON POST request and returns the successful envelope.
    ///
    /// A `None` body sends no payload.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: Option<&B>,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, ClientError> {
        let url = self.url(path);
        let body_value = match body {
            Some(b) => serde_json::to_value(b)?,
            None => Value::Null,
        };
        let key = request_signature("POST", &url, &Value::Null, &body_value);
        let mut request = self.http.post(&url).headers(self.headers()?);
        if !body_value.is_null() {
            request = request.json(&body_value);
        }
        self.dispatch(key, request, self.request_timeout, cancel)
            .await
    }

    /// Sends a DELETE request and returns the successful envelope.
    pub async fn delete(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, ClientError> {
        let url = self.url(path);
        let key = request_signature("DELETE", &url, &Value::Null, &Value::Null);
        let request = self.http.delete(&url).headers(self.headers()?);
        self.dispatch(key, request, self.request_timeout, cancel)
            .await
    }

    /// Sends a multipart POST request with its own timeout.
    pub async fn post_multipart(
        &self,
        path: &str,
        body: MultipartBody,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, ClientError> {
        let url = self.url(path);
        let key = request_signature("POST", &url, &Value::Null, &body.signature_value());
        let request = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .multipart(body.into_form());
        self.dispatch(key, request, timeout, cancel).await
    }

    async fn dispatch(
        &self,
        key: String,
        request: reqwest::RequestBuilder,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, ClientError> {
        let envelope = self
            .coalescer
            .run(key, cancel, async {
                tokio::time::timeout(timeout, send(request))
                    .await
                    .map_err(|_| ClientError::Timeout)?
            })
            .await?;
        self.classify(envelope)
    }

    fn classify(&self, envelope: ApiResponse) -> Result<ApiResponse, ClientError> {
        match envelope.result_code() {
            ResultCode::Success => Ok(envelope),
            ResultCode::SessionFatal => {
                warn!(code = envelope.code, message = %envelope.message, "session rejected, clearing credentials");
                self.credentials.clear();
                Err(ClientError::SessionFatal {
                    code: envelope.code,
                    message: envelope.message,
                })
            }
            ResultCode::Recoverable => Err(ClientError::Api {
                code: envelope.code,
                message: envelope.message,
            }),
        }
    }
}

/// Sends a request and parses the envelope.
///
/// An envelope in a non-2xx response is still honoured; a non-2xx response
/// without one becomes [`ClientError::Http`].
async fn send(request: reqwest::RequestBuilder) -> Result<ApiResponse, ClientError> {
    let resp = request.send().await?;
    let status = resp.status();
    let body = resp.bytes().await?;
    debug!(status = status.as_u16(), bytes = body.len(), "response received");

    match serde_json::from_slice::<ApiResponse>(&body) {
        Ok(envelope) => Ok(envelope),
        Err(_) if !status.is_success() => Err(ClientError::Http {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        }),
        Err(e) => Err(e.into()),
    }
}
