use serde::{Deserialize, Serialize};

/// State of an upload session on the client side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    Checking,
    Deduplicated,
    SessionInit,
    Resuming,
    Uploading,
    Merging,
    Completed,
    Aborted,
}

impl UploadState {
    /// Returns `true` for `Completed` and `Aborted`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }

    /// Returns `true` if the state machine allows moving from `self` to `next`.
    ///
    /// `Aborted` is reachable from every non-terminal state.
    pub fn can_transition_to(self, next: UploadState) -> bool {
        use UploadState::*;
        if self.is_terminal() {
            return false;
        }
        if next == Aborted {
            return true;
        }
        matches!(
            (self, next),
            (Checking, Deduplicated)
                | (Checking, SessionInit)
                | (Deduplicated, Completed)
                | (SessionInit, Resuming)
                | (Resuming, Uploading)
                | (Resuming, Merging)
                | (Uploading, Merging)
                | (Merging, Completed)
        )
    }
}

impl std::fmt::Display for UploadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Checking => "checking",
            Self::Deduplicated => "deduplicated",
            Self::SessionInit => "session_init",
            Self::Resuming => "resuming",
            Self::Uploading => "uploading",
            Self::Merging => "merging",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Progress snapshot of one upload session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub file_identifier: String,
    pub state: UploadState,
    pub total_bytes: u64,
    pub uploaded_bytes: u64,
    pub chunk_count: u32,
    pub present_parts: u32,
}

impl UploadProgress {
    /// Returns the upload progress as a percentage (0-100).
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.uploaded_bytes as f64 / self.total_bytes as f64 * 100.0
    }
}
