/// Errors from the API client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    /// An identical request was issued while this one was in flight.
    #[error("request superseded by an identical request")]
    Superseded,

    /// The caller's cancellation token fired.
    #[error("request cancelled")]
    Cancelled,

    /// Non-2xx HTTP status without a readable envelope.
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    /// The envelope carried a recoverable failure code.
    #[error("API error {code}: {message}")]
    Api { code: i32, message: String },

    /// The envelope reported missing or expired credentials.
    #[error("session expired ({code}): {message}")]
    SessionFatal { code: i32, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid header value: {0}")]
    InvalidHeader(String),
}

impl ClientError {
    /// Returns `true` for transport-level failures worth retrying as-is.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if the credential store was invalidated.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::SessionFatal { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ClientError::Timeout.is_transient());
        assert!(
            ClientError::Http {
                status: 503,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            !ClientError::Http {
                status: 404,
                body: String::new()
            }
            .is_transient()
        );
        assert!(!ClientError::Superseded.is_transient());
        assert!(
            !ClientError::Api {
                code: 500,
                message: "busy".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn session_fatal_display() {
        let err = ClientError::SessionFatal {
            code: 401,
            message: "token expired".into(),
        };
        assert!(err.is_session_fatal());
        assert_eq!(err.to_string(), "session expired (401): token expired");
    }
}
