//! Ingestion progress reporting.
//!
//! Files are extracted one at a time; reporters let the CLI show which file is
//! being processed and how each one ended. Progress goes to **stderr** so
//! stdout stays parseable (`docchat extract --json`).

use std::io::Write;

use crate::models::ExtractionStatus;

/// A single progress event emitted by the corpus store.
#[derive(Clone, Debug)]
pub enum IngestProgressEvent {
    /// Extraction of file `n` of `total` is starting.
    Extracting { name: String, n: u64, total: u64 },
    /// The filename was already ingested; the upload is ignored.
    Skipped { name: String },
    /// Extraction finished with the given status and text size.
    Finished {
        name: String,
        status: ExtractionStatus,
        bytes: u64,
    },
}

pub trait IngestProgressReporter: Send + Sync {
    fn report(&self, event: IngestProgressEvent);
}

/// Human-friendly lines: "extract  2 / 5  report.xlsx".
pub struct StderrProgress;

impl IngestProgressReporter for StderrProgress {
    fn report(&self, event: IngestProgressEvent) {
        let line = match &event {
            IngestProgressEvent::Extracting { name, n, total } => {
                format!(
                    "extract  {} / {}  {}\n",
                    format_number(*n),
                    format_number(*total),
                    name
                )
            }
            IngestProgressEvent::Skipped { name } => {
                format!("skip     {}  (already processed)\n", name)
            }
            IngestProgressEvent::Finished {
                name,
                status,
                bytes,
            } => match status.reason() {
                Some(reason) => format!(
                    "{:<8} {}  {} bytes  {}\n",
                    status.label(),
                    name,
                    format_number(*bytes),
                    reason
                ),
                None => format!(
                    "{:<8} {}  {} bytes\n",
                    status.label(),
                    name,
                    format_number(*bytes)
                ),
            },
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// One JSON object per line on stderr.
pub struct JsonProgress;

impl IngestProgressReporter for JsonProgress {
    fn report(&self, event: IngestProgressEvent) {
        let obj = match &event {
            IngestProgressEvent::Extracting { name, n, total } => serde_json::json!({
                "event": "extracting",
                "name": name,
                "n": n,
                "total": total
            }),
            IngestProgressEvent::Skipped { name } => serde_json::json!({
                "event": "skipped",
                "name": name
            }),
            IngestProgressEvent::Finished {
                name,
                status,
                bytes,
            } => serde_json::json!({
                "event": "finished",
                "name": name,
                "status": status.label(),
                "reason": status.reason(),
                "bytes": bytes
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

pub struct SilentProgress;

impl IngestProgressReporter for SilentProgress {
    fn report(&self, _event: IngestProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Selected with `docchat extract --progress`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn IngestProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(SilentProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
