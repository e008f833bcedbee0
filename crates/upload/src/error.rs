//! Upload error types.

use chunkup_client::ClientError;
use chunkup_protocol::UploadState;
use chunkup_transfer::TransferError;

/// Errors produced during an upload.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("transfer error: {0}")]
    Transfer(TransferError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("part {part_number} failed after {attempts} attempt(s): {source}")]
    PartFailed {
        part_number: u32,
        attempts: u32,
        #[source]
        source: Box<UploadError>,
    },

    /// The backend answered with data this client cannot use.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("upload aborted")]
    Aborted,

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: UploadState, to: UploadState },

    #[error("part task failed: {0}")]
    TaskFailed(String),
}

impl From<TransferError> for UploadError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::InvalidTransition { from, to } => Self::InvalidTransition { from, to },
            other => Self::Transfer(other),
        }
    }
}

impl From<serde_json::Error> for UploadError {
    fn from(err: serde_json::Error) -> Self {
        Self::Client(ClientError::Json(err))
    }
}

impl UploadError {
    /// The client error at the root of this failure, if any.
    pub fn client_error(&self) -> Option<&ClientError> {
        match self {
            Self::Client(e) => Some(e),
            Self::PartFailed { source, .. } => source.client_error(),
            _ => None,
        }
    }

    /// Returns `true` if the backend rejected the credentials.
    pub fn is_session_fatal(&self) -> bool {
        self.client_error().is_some_and(ClientError::is_session_fatal)
    }

    /// Returns `true` if a newer identical request replaced this call.
    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::Client(ClientError::Superseded))
    }

    /// Retry filter for check, init and merge: transport failures only.
    pub fn is_retryable_request(&self) -> bool {
        matches!(self, Self::Client(e) if e.is_transient())
    }

    /// Retry filter for part uploads.
    ///
    /// Adds superseded requests and recoverable API codes to the transport
    /// failures retried for control calls.
    pub fn is_retryable_part(&self) -> bool {
        match self {
            Self::Client(ClientError::Superseded | ClientError::Api { .. }) => true,
            Self::Client(e) => e.is_transient(),
            _ => false,
        }
    }
}
