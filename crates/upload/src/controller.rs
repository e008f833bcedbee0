//! Upload session controller.
//!
//! Drives one file through the session state machine:
//!
//! 1. **Fingerprint**: whole-file digest and per-chunk digests (0.0–0.1)
//! 2. **Check**: ask the backend what it already holds (0.1)
//! 3. **Init**: open or reuse a multipart session (0.1–0.15)
//! 4. **Upload**: send missing parts with bounded concurrency (0.15–0.95)
//! 5. **Merge**: assemble the object (0.95–1.0)

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chunkup_protocol::messages::UploadPartFields;
use chunkup_protocol::{InitUploadRequest, TaskCode, UploadState};
use chunkup_transfer::{
    Chunk, FileDigest, FileHasher, FingerprintPool, SpeedCalculator, TransferError,
    UploadSession, format_size, read_chunk, validate_file_name,
};

use crate::backend::{PartUpload, UploadBackend};
use crate::error::UploadError;
use crate::retry::RetryPolicy;
use crate::settings::UploadSettings;
use crate::types::{UploadEvent, UploadSummary};

const PROGRESS_HASHING: f64 = 0.0;
const PROGRESS_CHECK: f64 = 0.1;
const PROGRESS_INIT: f64 = 0.12;
const PROGRESS_PARTS: f64 = 0.15;
const PROGRESS_MERGE: f64 = 0.95;
const PROGRESS_DONE: f64 = 1.0;

/// Uploads single files against an [`UploadBackend`].
pub struct UploadController {
    backend: Arc<dyn UploadBackend>,
    settings: UploadSettings,
    cancel: CancellationToken,
    events: mpsc::Sender<UploadEvent>,
    /// Bits of the last emitted progress value.
    last_progress: AtomicU64,
}

impl UploadController {
    /// Creates a controller. Cancelling `cancel` aborts the current upload.
    pub fn new(
        backend: Arc<dyn UploadBackend>,
        settings: UploadSettings,
        cancel: CancellationToken,
        events: mpsc::Sender<UploadEvent>,
    ) -> Self {
        Self {
            backend,
            settings,
            cancel,
            events,
            last_progress: AtomicU64::new(0),
        }
    }

    /// Uploads the file at `path`.
    ///
    /// On failure the session is aborted and no further calls are made for
    /// this attempt.
    pub async fn upload(&self, path: &Path) -> Result<UploadSummary, UploadError> {
        self.last_progress.store(0f64.to_bits(), Ordering::Relaxed);
        self.check_cancelled()?;

        let file_name = file_name_of(path)?;
        validate_file_name(&file_name)?;
        let total_size = tokio::fs::metadata(path)
            .await
            .map_err(TransferError::FileRead)?
            .len();

        self.emit_progress(&file_name, PROGRESS_HASHING, 0, total_size, 0.0, "Hashing file...");
        let (digest, chunks) = self.fingerprint(path, total_size).await?;

        let mut session =
            UploadSession::new(digest.hash, file_name, total_size, self.settings.chunk_size)?;
        info!(
            file = %session.file_name(),
            hash = %session.file_identifier(),
            size = %format_size(total_size),
            chunks = session.chunk_count(),
            "file fingerprinted"
        );
        self.emit_state(&session);

        let result = self.drive(&mut session, path, &chunks).await;
        if result.is_err() {
            let before = session.state();
            session.abort();
            if session.state() != before {
                self.emit_state(&session);
            }
        }
        result
    }

    /// Computes the whole-file digest and the per-chunk digests together.
    async fn fingerprint(
        &self,
        path: &Path,
        total_size: u64,
    ) -> Result<(FileDigest, Vec<Chunk>), UploadError> {
        let hasher = FileHasher::new(self.settings.algorithm, self.settings.read_window);
        let pool = FingerprintPool::new(self.settings.hash_workers, self.settings.algorithm);

        let work = async {
            tokio::try_join!(
                hasher.hash_prefix(path, total_size),
                pool.fingerprint(path, total_size, self.settings.chunk_size),
            )
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(UploadError::Aborted),
            result = work => Ok(result?),
        }
    }

    async fn drive(
        &self,
        session: &mut UploadSession,
        path: &Path,
        chunks: &[Chunk],
    ) -> Result<UploadSummary, UploadError> {
        let file = session.file_name().to_string();
        let file_hash = session.file_identifier().to_string();
        let total_size = session.total_size();

        // 1. Check
        self.emit_progress(&file, PROGRESS_CHECK, 0, total_size, 0.0, "Checking server...");
        let task = self
            .request("check", |_| self.backend.check(&file_hash, &self.cancel))
            .await?;
        debug!(file = %file, code = ?task.code, upload_id = ?task.upload_id(), "check response");

        if task.code == TaskCode::UploadSuccess {
            self.transition(session, UploadState::Deduplicated)?;
            self.transition(session, UploadState::Completed)?;
            info!(file = %file, "content already stored, nothing to upload");
            self.emit_progress(
                &file,
                PROGRESS_DONE,
                total_size,
                total_size,
                0.0,
                "Instant upload complete",
            );
            return Ok(summary(session, true, 0, 0, task.object_ref().map(str::to_string)));
        }

        // 2. Init, reusing the backend's session for this content when it has one.
        self.transition(session, UploadState::SessionInit)?;
        let seed_parts = match (task.code, task.upload_id()) {
            (TaskCode::Uploading, Some(upload_id)) => {
                info!(file = %file, upload_id, "resuming existing session");
                session.set_upload_id(upload_id);
                true
            }
            _ => {
                self.emit_progress(&file, PROGRESS_INIT, 0, total_size, 0.0, "Initializing upload...");
                let request = InitUploadRequest {
                    file_identifier: file_hash.clone(),
                    total_size,
                    chunk_num: session.chunk_count(),
                    chunk_size: session.chunk_size(),
                    file_name: file.clone(),
                };
                let upload_id = self
                    .request("init", |_| self.backend.init(&request, &self.cancel))
                    .await?;
                info!(file = %file, upload_id = %upload_id, "upload session opened");
                let same_session = task.upload_id() == Some(upload_id.as_str());
                session.set_upload_id(upload_id);
                same_session
            }
        };

        let parts_reused = if seed_parts {
            session.seed_present_parts(task.present_part_numbers()) as u32
        } else {
            0
        };
        self.transition(session, UploadState::Resuming)?;

        // 3. Upload missing parts.
        let missing = session.missing_parts();
        let parts_uploaded = missing.len() as u32;
        info!(
            file = %file,
            present = parts_reused,
            missing = parts_uploaded,
            "resume plan computed"
        );
        self.emit_progress(
            &file,
            parts_progress(session.uploaded_bytes(), total_size),
            session.uploaded_bytes(),
            total_size,
            0.0,
            "Uploading...",
        );

        if !missing.is_empty() {
            self.transition(session, UploadState::Uploading)?;
            self.upload_parts(session, path, chunks, missing).await?;
        }

        // 4. Merge
        self.transition(session, UploadState::Merging)?;
        self.emit_progress(&file, PROGRESS_MERGE, total_size, total_size, 0.0, "Merging parts...");
        let url = self
            .request("merge", |_| self.backend.merge(&file_hash, &self.cancel))
            .await?;
        self.transition(session, UploadState::Completed)?;
        self.emit_progress(&file, PROGRESS_DONE, total_size, total_size, 0.0, "Upload complete");

        Ok(summary(session, false, parts_uploaded, parts_reused, url))
    }

    /// Runs a control call under the request retry policy.
    async fn request<T, F, Fut>(&self, op: &str, call: F) -> Result<T, UploadError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, UploadError>>,
    {
        let (result, attempts) = self
            .settings
            .request_retry()
            .run(&self.cancel, UploadError::is_retryable_request, call)
            .await;
        if let Err(e) = &result {
            debug!(op, attempts, error = %e, "request failed");
        }
        result
    }

    async fn upload_parts(
        &self,
        session: &mut UploadSession,
        path: &Path,
        chunks: &[Chunk],
        missing: Vec<u32>,
    ) -> Result<(), UploadError> {
        let file = session.file_name().to_string();
        let upload_id = session
            .upload_id()
            .ok_or_else(|| UploadError::Protocol("no upload id for part upload".into()))?
            .to_string();

        let semaphore = Arc::new(Semaphore::new(self.settings.part_concurrency()));
        let batch = self.cancel.child_token();
        let policy = self.settings.part_retry();
        let mut tasks = JoinSet::new();

        for index in missing {
            let chunk = chunks.get(index as usize).cloned().ok_or_else(|| {
                UploadError::Protocol(format!("no fingerprint for chunk {index}"))
            })?;
            tasks.spawn(run_part(PartJob {
                backend: Arc::clone(&self.backend),
                semaphore: Arc::clone(&semaphore),
                cancel: batch.clone(),
                policy: policy.clone(),
                path: path.to_path_buf(),
                file_name: file.clone(),
                upload_id: upload_id.clone(),
                chunk,
            }));
        }

        let mut speed = SpeedCalculator::default();
        speed.record(0);
        let mut first_error = None;

        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.unwrap_or_else(|e| Err(UploadError::TaskFailed(e.to_string())));
            match outcome {
                Ok(report) => {
                    session.mark_present(report.index);
                    speed.record(report.bytes);
                    let part_number = report.index + 1;
                    debug!(file = %file, part_number, attempts = report.attempts, "part uploaded");
                    self.emit(UploadEvent::PartUploaded {
                        file: file.clone(),
                        part_number,
                    });
                    self.emit_part_progress(session, &speed);
                }
                Err(e) => {
                    if first_error.is_none() {
                        if !matches!(e, UploadError::Aborted) {
                            warn!(file = %file, error = %e, "part failed, cancelling remaining parts");
                        }
                        batch.cancel();
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn transition(
        &self,
        session: &mut UploadSession,
        next: UploadState,
    ) -> Result<(), UploadError> {
        session.transition(next)?;
        self.emit_state(session);
        Ok(())
    }

    fn emit_state(&self, session: &UploadSession) {
        info!(file = %session.file_name(), state = %session.state(), "upload state changed");
        self.emit(UploadEvent::StateChanged {
            file: session.file_name().to_string(),
            state: session.state(),
        });
    }

    /// Emits a progress event, never going below the last emitted value.
    fn emit_progress(
        &self,
        file: &str,
        progress: f64,
        uploaded_bytes: u64,
        total_bytes: u64,
        bytes_per_second: f64,
        status: &str,
    ) {
        self.emit(UploadEvent::Progress {
            file: file.to_string(),
            progress: self.monotonic(progress),
            uploaded_bytes,
            total_bytes,
            bytes_per_second,
            eta_secs: None,
            status: status.to_string(),
        });
    }

    /// Emits progress after a part lands, with speed and time remaining.
    fn emit_part_progress(&self, session: &UploadSession, speed: &SpeedCalculator) {
        let snapshot = session.progress();
        let remaining = snapshot.total_bytes.saturating_sub(snapshot.uploaded_bytes);
        self.emit(UploadEvent::Progress {
            file: session.file_name().to_string(),
            progress: self.monotonic(parts_progress(
                snapshot.uploaded_bytes,
                snapshot.total_bytes,
            )),
            uploaded_bytes: snapshot.uploaded_bytes,
            total_bytes: snapshot.total_bytes,
            bytes_per_second: speed.bytes_per_second(),
            eta_secs: speed.eta(remaining).map(|eta| eta.as_secs()),
            status: format!(
                "Uploading: {}/{} parts",
                snapshot.present_parts, snapshot.chunk_count
            ),
        });
    }

    /// Raises the progress high-water mark and returns it.
    fn monotonic(&self, progress: f64) -> f64 {
        // Non-negative floats order the same way as their bit patterns.
        let bits = progress.clamp(0.0, 1.0).to_bits();
        let previous = self.last_progress.fetch_max(bits, Ordering::Relaxed);
        f64::from_bits(previous.max(bits))
    }

    fn emit(&self, event: UploadEvent) {
        match self.events.try_send(event) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(event)) => {
                debug!(?event, "event channel full, dropping event");
            }
        }
    }

    fn check_cancelled(&self) -> Result<(), UploadError> {
        if self.cancel.is_cancelled() {
            Err(UploadError::Aborted)
        } else {
            Ok(())
        }
    }
}

pub(crate) fn file_name_of(path: &Path) -> Result<String, TransferError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            TransferError::InvalidInput(format!("path has no file name: {}", path.display()))
        })
}

/// Maps uploaded bytes onto the part-upload progress range.
fn parts_progress(uploaded: u64, total: u64) -> f64 {
    if total == 0 {
        return PROGRESS_PARTS;
    }
    PROGRESS_PARTS + (uploaded as f64 / total as f64) * (PROGRESS_MERGE - PROGRESS_PARTS)
}

fn summary(
    session: &UploadSession,
    deduplicated: bool,
    parts_uploaded: u32,
    parts_reused: u32,
    url: Option<String>,
) -> UploadSummary {
    UploadSummary {
        file_identifier: session.file_identifier().to_string(),
        file_name: session.file_name().to_string(),
        total_size: session.total_size(),
        chunk_count: session.chunk_count(),
        deduplicated,
        parts_uploaded,
        parts_reused,
        url,
    }
}

// ---------------------------------------------------------------------------
// Part tasks
// ---------------------------------------------------------------------------

/// Everything one part task owns.
struct PartJob {
    backend: Arc<dyn UploadBackend>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    policy: RetryPolicy,
    path: PathBuf,
    file_name: String,
    upload_id: String,
    chunk: Chunk,
}

struct PartReport {
    index: u32,
    bytes: u64,
    attempts: u32,
}

/// Waits for a permit, reads the chunk, and sends it with retries.
async fn run_part(job: PartJob) -> Result<PartReport, UploadError> {
    let _permit = tokio::select! {
        biased;
        _ = job.cancel.cancelled() => return Err(UploadError::Aborted),
        permit = Arc::clone(&job.semaphore).acquire_owned() => {
            permit.map_err(|_| UploadError::Aborted)?
        }
    };

    let range = job.chunk.range();
    let part_number = range.part_number();
    let bytes = read_chunk(&job.path, &range).await?;
    debug!(
        part_number,
        bytes = bytes.len(),
        hash = %job.chunk.content_hash,
        "sending part"
    );

    let (result, attempts) = job
        .policy
        .run(&job.cancel, UploadError::is_retryable_part, |_| {
            job.backend.upload_part(
                PartUpload {
                    fields: UploadPartFields {
                        upload_id: job.upload_id.clone(),
                        part_number,
                    },
                    file_name: job.file_name.clone(),
                    bytes: bytes.clone(),
                    content_hash: job.chunk.content_hash.clone(),
                },
                &job.cancel,
            )
        })
        .await;

    match result {
        Ok(()) => Ok(PartReport {
            index: range.index,
            bytes: range.len(),
            attempts,
        }),
        Err(UploadError::Aborted) => Err(UploadError::Aborted),
        Err(source) => Err(UploadError::PartFailed {
            part_number,
            attempts,
            source: Box::new(source),
        }),
    }
}
