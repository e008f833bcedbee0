use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::UploadBackend;
use crate::controller::UploadController;
use crate::settings::UploadSettings;
use crate::types::{UploadEvent, UploadResult};

/// Uploads a batch of files, one after another, and reports per-file results.
pub struct UploadOrchestrator {
    controller: UploadController,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
    cancel: CancellationToken,
}

impl UploadOrchestrator {
    /// Creates a new orchestrator.
    pub fn new(backend: Arc<dyn UploadBackend>, settings: UploadSettings) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        let cancel = CancellationToken::new();
        Self {
            controller: UploadController::new(backend, settings, cancel.clone(), events_tx.clone()),
            events_tx,
            events_rx: Some(events_rx),
            cancel,
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    /// Returns the cancellation token shared by every upload of this orchestrator.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Uploads `files` in order.
    ///
    /// A failed file does not stop the batch; cancellation does.
    pub async fn upload(&self, files: Vec<PathBuf>) -> Vec<UploadResult> {
        let mut results = Vec::with_capacity(files.len());
        for path in files {
            if self.cancel.is_cancelled() {
                warn!(file = %path.display(), "batch cancelled, skipping");
                results.push(UploadResult {
                    file: display_name(&path),
                    success: false,
                    error: Some("upload aborted".into()),
                    summary: None,
                });
                continue;
            }
            results.push(self.upload_file(&path).await);
        }
        results
    }

    /// Uploads a single file and emits its terminal event.
    pub async fn upload_file(&self, path: &Path) -> UploadResult {
        let file = display_name(path);

        match self.controller.upload(path).await {
            Ok(summary) => {
                self.notify(UploadEvent::Completed {
                    file: file.clone(),
                    url: summary.url.clone(),
                })
                .await;
                info!(
                    file = %file,
                    deduplicated = summary.deduplicated,
                    parts_uploaded = summary.parts_uploaded,
                    parts_reused = summary.parts_reused,
                    "upload completed"
                );

                UploadResult {
                    file,
                    success: true,
                    error: None,
                    summary: Some(summary),
                }
            }
            Err(e) => {
                let err_msg = e.to_string();
                if e.is_superseded() {
                    debug!(file = %file, "upload superseded by a newer identical request");
                } else {
                    if e.is_session_fatal() {
                        self.notify(UploadEvent::LoginRequired { file: file.clone() })
                            .await;
                    }
                    self.notify(UploadEvent::Failed {
                        file: file.clone(),
                        error: err_msg.clone(),
                    })
                    .await;
                    error!(file = %file, error = %err_msg, "upload failed");
                }

                UploadResult {
                    file,
                    success: false,
                    error: Some(err_msg),
                    summary: None,
                }
            }
        }
    }
}

impl UploadOrchestrator {
    /// Delivers a terminal event to the listener, waiting for room.
    ///
    /// Skipped while the receiver has not been taken: nothing drains the
    /// channel then, and a full buffer would block forever.
    async fn notify(&self, event: UploadEvent) {
        if self.events_rx.is_some() {
            debug!(?event, "no event listener, dropping event");
            return;
        }
        let _ = self.events_tx.send(event).await;
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
