//! Turns upload events into terminal lines.

use std::collections::HashMap;

use chunkup_protocol::FileEntry;
use chunkup_transfer::format_size;
use chunkup_upload::{UploadEvent, UploadResult};

/// Percent step between two printed progress lines.
const PROGRESS_STEP: u32 = 10;

/// Formats events, throttling progress to one line per step per file.
#[derive(Debug, Default)]
pub struct EventPrinter {
    last_percent: HashMap<String, u32>,
}

impl EventPrinter {
    /// Returns the line to print for `event`, if any.
    pub fn line(&mut self, event: &UploadEvent) -> Option<String> {
        match event {
            UploadEvent::StateChanged { file, state } => Some(format!("{file}: {state}")),
            UploadEvent::Progress {
                file,
                progress,
                uploaded_bytes,
                total_bytes,
                bytes_per_second,
                eta_secs,
                status,
            } => {
                let percent = (progress * 100.0).floor() as u32;
                let bucket = percent / PROGRESS_STEP * PROGRESS_STEP;
                let last = self.last_percent.get(file).copied();
                if last.is_some_and(|l| l >= bucket) {
                    return None;
                }
                self.last_percent.insert(file.clone(), bucket);

                let mut line = format!(
                    "{file}: {percent:>3}% {}/{} {status}",
                    format_size(*uploaded_bytes),
                    format_size(*total_bytes)
                );
                if *bytes_per_second > 0.0 {
                    line.push_str(&format!(" ({}/s)", format_size(*bytes_per_second as u64)));
                }
                if let Some(eta) = eta_secs {
                    line.push_str(&format!(" ETA {}", format_eta(*eta)));
                }
                Some(line)
            }
            UploadEvent::PartUploaded { .. } => None,
            UploadEvent::Completed { file, url } => {
                self.last_percent.remove(file);
                Some(match url {
                    Some(url) => format!("{file}: done -> {url}"),
                    None => format!("{file}: done"),
                })
            }
            UploadEvent::Failed { file, error } => {
                self.last_percent.remove(file);
                Some(format!("{file}: failed: {error}"))
            }
            UploadEvent::LoginRequired { file } => Some(format!(
                "{file}: credentials rejected, run `chunkup login --token <TOKEN>`"
            )),
        }
    }
}

/// Formats seconds as `42s`, `3m05s` or `1h02m`.
fn format_eta(secs: u64) -> String {
    match secs {
        0..60 => format!("{secs}s"),
        60..3600 => format!("{}m{:02}s", secs / 60, secs % 60),
        _ => format!("{}h{:02}m", secs / 3600, secs % 3600 / 60),
    }
}

/// One row of the `files` listing.
pub fn file_line(entry: &FileEntry) -> String {
    format!(
        "{:>8}  {:>10}  {:<19}  {}  {}",
        entry.id,
        format_size(entry.size),
        entry.upload_time,
        entry.origin_file_name,
        entry.url
    )
}

/// One-line batch summary.
pub fn summary(results: &[UploadResult]) -> String {
    let ok = results.iter().filter(|r| r.success).count();
    let dedup = results
        .iter()
        .filter(|r| r.summary.as_ref().is_some_and(|s| s.deduplicated))
        .count();
    let bytes: u64 = results
        .iter()
        .filter_map(|r| r.summary.as_ref())
        .map(|s| s.total_size)
        .sum();
    format!(
        "{ok}/{} file(s) uploaded ({dedup} instant), {}",
        results.len(),
        format_size(bytes)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkup_upload::UploadSummary;

    fn progress(file: &str, value: f64) -> UploadEvent {
        UploadEvent::Progress {
            file: file.into(),
            progress: value,
            uploaded_bytes: 0,
            total_bytes: 2048,
            bytes_per_second: 0.0,
            eta_secs: None,
            status: "Uploading...".into(),
        }
    }

    #[test]
    fn progress_is_throttled_per_file() {
        let mut printer = EventPrinter::default();
        assert!(printer.line(&progress("a", 0.0)).is_some());
        assert!(printer.line(&progress("a", 0.05)).is_none());
        assert!(printer.line(&progress("b", 0.05)).is_some());
        let line = printer.line(&progress("a", 0.12)).unwrap();
        assert!(line.starts_with("a:  12%"), "{line}");
        assert!(line.contains("2.00 KB"), "{line}");
    }

    #[test]
    fn progress_shows_speed_and_eta() {
        let mut printer = EventPrinter::default();
        let line = printer
            .line(&UploadEvent::Progress {
                file: "big.bin".into(),
                progress: 0.5,
                uploaded_bytes: 1024 * 1024,
                total_bytes: 2 * 1024 * 1024,
                bytes_per_second: 2048.0,
                eta_secs: Some(185),
                status: "Uploading: 1/2 parts".into(),
            })
            .unwrap();
        assert!(line.contains("(2.00 KB/s)"), "{line}");
        assert!(line.ends_with("ETA 3m05s"), "{line}");
    }

    #[test]
    fn eta_formats() {
        assert_eq!(format_eta(42), "42s");
        assert_eq!(format_eta(3600 + 120), "1h02m");
    }

    #[test]
    fn terminal_events_always_print() {
        let mut printer = EventPrinter::default();
        let done = printer.line(&UploadEvent::Completed {
            file: "a".into(),
            url: Some("https://cdn/a".into()),
        });
        assert_eq!(done.as_deref(), Some("a: done -> https://cdn/a"));
        assert!(
            printer
                .line(&UploadEvent::PartUploaded {
                    file: "a".into(),
                    part_number: 1
                })
                .is_none()
        );
    }

    #[test]
    fn file_rows_align() {
        let entry = FileEntry {
            id: 7,
            origin_file_name: "a.bin".into(),
            size: 2048,
            url: "https://cdn/a.bin".into(),
            upload_time: "2024-05-01 10:00:00".into(),
            md5: String::new(),
        };
        assert_eq!(
            file_line(&entry),
            "       7     2.00 KB  2024-05-01 10:00:00  a.bin  https://cdn/a.bin"
        );
    }

    #[test]
    fn summary_counts() {
        let results = vec![
            UploadResult {
                file: "a".into(),
                success: true,
                error: None,
                summary: Some(UploadSummary {
                    file_identifier: "h".into(),
                    file_name: "a".into(),
                    total_size: 1024,
                    chunk_count: 1,
                    deduplicated: true,
                    parts_uploaded: 0,
                    parts_reused: 0,
                    url: None,
                }),
            },
            UploadResult {
                file: "b".into(),
                success: false,
                error: Some("boom".into()),
                summary: None,
            },
        ];
        assert_eq!(summary(&results), "1/2 file(s) uploaded (1 instant), 1.00 KB");
    }
}
