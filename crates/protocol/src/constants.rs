use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default chunk size: 20 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 20 * 1024 * 1024;

/// Timeout for control requests (check, init, merge).
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Timeout for a single part upload.
///
/// A part carries up to one full chunk of raw bytes, so it gets a longer
/// deadline than the JSON control calls.
pub const PART_UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Default route prefix of the multipart API.
pub const DEFAULT_API_PREFIX: &str = "/bunUpload/multipart";

/// Path of the dedup/resume query, relative to the API prefix.
pub const CHECK_PATH: &str = "/check";

/// Path of the session-init call.
pub const INIT_PATH: &str = "/init";

/// Path of the part upload call.
pub const UPLOAD_PART_PATH: &str = "/uploadPart";

/// Path of the finalize call.
pub const MERGE_PATH: &str = "/merge";

/// Route prefix of the file management calls.
pub const DEFAULT_SERVICE_PREFIX: &str = "/bunUpload";

/// Path of the stored-file listing, relative to the service prefix.
/// A file is deleted at `FILES_PATH/{id}`.
pub const FILES_PATH: &str = "/files";

/// Path of the non-chunked upload.
pub const SINGLE_UPLOAD_PATH: &str = "/singleUpload";

/// Envelope code for a successful call.
pub const CODE_SUCCESS: i32 = 200;

/// How the client must treat an envelope `code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    /// `200`.
    Success,
    /// Credentials missing or invalid: `400..=407` and `512`.
    SessionFatal,
    /// Any other code. The call failed but the session is still usable.
    Recoverable,
}

impl ResultCode {
    /// Classifies an envelope code.
    pub fn classify(code: i32) -> Self {
        match code {
            CODE_SUCCESS => Self::Success,
            400..=407 | 512 => Self::SessionFatal,
            _ => Self::Recoverable,
        }
    }
}

/// Task status reported inside a check response.
///
/// Serialized as the backend's numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum TaskCode {
    /// The object is fully stored (instant upload).
    UploadSuccess,
    /// A multipart session exists and some parts may be present.
    Uploading,
    /// The backend has never seen this content hash.
    NotUploaded,
    /// A previous attempt failed server-side.
    UploadFailed,
    /// A code this client does not know.
    Unknown(i32),
}

impl From<i32> for TaskCode {
    fn from(code: i32) -> Self {
        match code {
            2001 => Self::UploadSuccess,
            2002 => Self::Uploading,
            2003 => Self::NotUploaded,
            5001 => Self::UploadFailed,
            other => Self::Unknown(other),
        }
    }
}

impl From<TaskCode> for i32 {
    fn from(code: TaskCode) -> Self {
        match code {
            TaskCode::UploadSuccess => 2001,
            TaskCode::Uploading => 2002,
            TaskCode::NotUploaded => 2003,
            TaskCode::UploadFailed => 5001,
            TaskCode::Unknown(other) => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_success() {
        assert_eq!(ResultCode::classify(200), ResultCode::Success);
    }

    #[test]
    fn classify_session_fatal_range() {
        for code in 400..=407 {
            assert_eq!(ResultCode::classify(code), ResultCode::SessionFatal, "{code}");
        }
        assert_eq!(ResultCode::classify(512), ResultCode::SessionFatal);
    }

    #[test]
    fn classify_recoverable() {
        for code in [201, 399, 408, 409, 500, 511, 513, 2012] {
            assert_eq!(ResultCode::classify(code), ResultCode::Recoverable, "{code}");
        }
    }

    #[test]
    fn task_code_numeric_serde() {
        assert_eq!(serde_json::to_string(&TaskCode::UploadSuccess).unwrap(), "2001");
        let parsed: TaskCode = serde_json::from_str("2002").unwrap();
        assert_eq!(parsed, TaskCode::Uploading);
        let unknown: TaskCode = serde_json::from_str("42").unwrap();
        assert_eq!(unknown, TaskCode::Unknown(42));
        assert_eq!(i32::from(unknown), 42);
    }
}
