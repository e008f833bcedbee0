//! Scripted backend and mock HTTP server shared by the crate's tests.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use chunkup_client::ClientError;
use chunkup_protocol::{InitUploadRequest, TaskCode, TaskInfo};

use crate::backend::{BackendFuture, PartUpload, UploadBackend};
use crate::error::UploadError;

/// A scripted failure.
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    Timeout,
    SessionFatal,
    Api,
    Superseded,
}

impl Fault {
    fn into_error(self) -> UploadError {
        let err = match self {
            Self::Timeout => ClientError::Timeout,
            Self::SessionFatal => ClientError::SessionFatal {
                code: 401,
                message: "token expired".into(),
            },
            Self::Api => ClientError::Api {
                code: 500,
                message: "busy".into(),
            },
            Self::Superseded => ClientError::Superseded,
        };
        UploadError::Client(err)
    }
}

pub struct MockBackend {
    check_response: TaskInfo,
    check_faults: Mutex<VecDeque<Fault>>,
    part_faults: Mutex<HashMap<u32, VecDeque<Fault>>>,
    part_delay: Duration,
    checks: AtomicUsize,
    inits: Mutex<Vec<InitUploadRequest>>,
    attempts: Mutex<HashMap<u32, u32>>,
    uploaded: Mutex<Vec<(u32, usize)>>,
    upload_ids: Mutex<Vec<String>>,
    merges: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            check_response: TaskInfo {
                code: TaskCode::NotUploaded,
                upload_id: None,
                exit_part_list: None,
                object_name: None,
                url: None,
            },
            check_faults: Mutex::new(VecDeque::new()),
            part_faults: Mutex::new(HashMap::new()),
            part_delay: Duration::ZERO,
            checks: AtomicUsize::new(0),
            inits: Mutex::new(Vec::new()),
            attempts: Mutex::new(HashMap::new()),
            uploaded: Mutex::new(Vec::new()),
            upload_ids: Mutex::new(Vec::new()),
            merges: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with_check(mut self, info: TaskInfo) -> Self {
        self.check_response = info;
        self
    }

    /// Faults returned by the next check calls, in order.
    pub fn with_check_faults(self, faults: Vec<Fault>) -> Self {
        *self.check_faults.lock().unwrap() = faults.into();
        self
    }

    /// Faults returned by the next attempts of `part_number`, in order.
    pub fn with_part_faults(self, part_number: u32, faults: Vec<Fault>) -> Self {
        self.part_faults
            .lock()
            .unwrap()
            .insert(part_number, faults.into());
        self
    }

    pub fn with_part_delay(mut self, delay: Duration) -> Self {
        self.part_delay = delay;
        self
    }

    pub fn check_count(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn init_requests(&self) -> Vec<InitUploadRequest> {
        self.inits.lock().unwrap().clone()
    }

    /// `(part_number, size)` of every stored part.
    pub fn uploaded_parts(&self) -> Vec<(u32, usize)> {
        self.uploaded.lock().unwrap().clone()
    }

    pub fn part_upload_ids(&self) -> Vec<String> {
        self.upload_ids.lock().unwrap().clone()
    }

    pub fn part_attempts(&self, part_number: u32) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(&part_number)
            .copied()
            .unwrap_or(0)
    }

    pub fn merge_count(&self) -> usize {
        self.merges.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl UploadBackend for MockBackend {
    fn check<'a>(
        &'a self,
        _file_hash: &'a str,
        _cancel: &'a CancellationToken,
    ) -> BackendFuture<'a, TaskInfo> {
        Box::pin(async move {
            self.checks.fetch_add(1, Ordering::SeqCst);
            if let Some(fault) = self.check_faults.lock().unwrap().pop_front() {
                return Err(fault.into_error());
            }
            Ok(self.check_response.clone())
        })
    }

    fn init<'a>(
        &'a self,
        request: &'a InitUploadRequest,
        _cancel: &'a CancellationToken,
    ) -> BackendFuture<'a, String> {
        Box::pin(async move {
            self.inits.lock().unwrap().push(request.clone());
            Ok("upload-1".to_string())
        })
    }

    fn upload_part<'a>(
        &'a self,
        part: PartUpload,
        cancel: &'a CancellationToken,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let number = part.fields.part_number;
            *self.attempts.lock().unwrap().entry(number).or_insert(0) += 1;

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let _guard = InFlight(&self.in_flight);

            if !self.part_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(UploadError::Client(ClientError::Cancelled));
                    }
                    _ = tokio::time::sleep(self.part_delay) => {}
                }
            }

            let fault = self
                .part_faults
                .lock()
                .unwrap()
                .get_mut(&number)
                .and_then(VecDeque::pop_front);
            if let Some(fault) = fault {
                return Err(fault.into_error());
            }

            self.uploaded.lock().unwrap().push((number, part.bytes.len()));
            self.upload_ids.lock().unwrap().push(part.fields.upload_id);
            Ok(())
        })
    }

    fn merge<'a>(
        &'a self,
        _file_hash: &'a str,
        _cancel: &'a CancellationToken,
    ) -> BackendFuture<'a, Option<String>> {
        Box::pin(async move {
            self.merges.fetch_add(1, Ordering::SeqCst);
            Ok(Some("https://cdn/object".to_string()))
        })
    }
}

/// Writes `len` bytes of patterned data and returns the path and contents.
pub fn write_file(dir: &TempDir, name: &str, len: usize) -> (PathBuf, Vec<u8>) {
    let data: Vec<u8> = (0..len).map(|i| (i * 31 % 251) as u8).collect();
    let path = dir.path().join(name);
    std::fs::write(&path, &data).unwrap();
    (path, data)
}

/// Reads headers, then `Content-Length` bytes of body.
async fn read_request(stream: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&data[..pos]).to_lowercase();
            let len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if data.len() >= pos + 4 + len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&data).into_owned()
}

/// Starts a mock HTTP server that answers each connection with the next
/// body in `bodies`, forwarding the raw request.
pub async fn mock_server(
    bodies: Vec<&str>,
) -> (String, mpsc::UnboundedReceiver<String>, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let url = format!("http://127.0.0.1:{port}");
    let bodies: Vec<String> = bodies.into_iter().map(String::from).collect();
    let (tx, rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        for body in bodies {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let request = read_request(&mut stream).await;
            let _ = tx.send(request);

            let resp = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(resp.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    (url, rx, handle)
}

/// Waits for the next request and returns its request line.
pub async fn request_line(requests: &mut mpsc::UnboundedReceiver<String>) -> String {
    let raw = requests.recv().await.unwrap();
    raw.lines().next().unwrap_or_default().to_string()
}
