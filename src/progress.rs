//! Scan progress reporting.
//!
//! Reports observable progress during `atlas scan` so users see how many files
//! were found, which one just finished and how much is left. Progress is
//! emitted on **stderr** so stdout stays parseable for scripts.

use std::io::Write;

/// Outcome of one file, as shown in progress lines.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileOutcome {
    Analyzed,
    Unchanged,
    Failed,
}

impl FileOutcome {
    fn label(&self) -> &'static str {
        match self {
            FileOutcome::Analyzed => "analyzed",
            FileOutcome::Unchanged => "unchanged",
            FileOutcome::Failed => "failed",
        }
    }
}

/// A single progress event for a scan.
#[derive(Clone, Debug)]
pub enum ScanProgressEvent {
    /// The walker finished; `total` files will be considered.
    Discovered { root: String, total: u64 },
    /// File `n` of `total` finished.
    File {
        path: String,
        outcome: FileOutcome,
        n: u64,
        total: u64,
    },
}

/// Reports scan progress. Implementations write to stderr (human or JSON).
pub trait ScanProgressReporter: Send + Sync {
    fn report(&self, event: ScanProgressEvent);
}

/// Human-friendly progress on stderr: "scan  12 / 340 files  analyzed  src/a.go".
pub struct StderrProgress;

impl ScanProgressReporter for StderrProgress {
    fn report(&self, event: ScanProgressEvent) {
        let line = match &event {
            ScanProgressEvent::Discovered { root, total } => {
                format!("scan {}  found {} files\n", root, format_number(*total))
            }
            ScanProgressEvent::File {
                path,
                outcome,
                n,
                total,
            } => format!(
                "scan  {} / {} files  {}  {}\n",
                format_number(*n),
                format_number(*total),
                outcome.label(),
                path
            ),
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ScanProgressReporter for JsonProgress {
    fn report(&self, event: ScanProgressEvent) {
        let obj = match &event {
            ScanProgressEvent::Discovered { root, total } => serde_json::json!({
                "event": "progress",
                "phase": "discovered",
                "root": root,
                "total": total
            }),
            ScanProgressEvent::File {
                path,
                outcome,
                n,
                total,
            } => serde_json::json!({
                "event": "progress",
                "phase": "file",
                "path": path,
                "outcome": outcome.label(),
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ScanProgressReporter for NoProgress {
    fn report(&self, _event: ScanProgressEvent) {}
}

pub(crate) fn format_number(n: u64) -> String {
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

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Parse the `--progress` flag; `None` picks by TTY.
    pub fn from_flag(flag: Option<&str>) -> Result<Self, String> {
        match flag {
            None => Ok(Self::default_for_tty()),
            Some("off") | Some("none") => Ok(ProgressMode::Off),
            Some("human") => Ok(ProgressMode::Human),
            Some("json") => Ok(ProgressMode::Json),
            Some(other) => Err(format!(
                "unknown progress mode '{}': expected off, human or json",
                other
            )),
        }
    }

    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ScanProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
