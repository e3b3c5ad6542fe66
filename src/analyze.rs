//! Orchestrator: directory scan and per-file window loop.
//!
//! # Pipeline
//!
//! ```text
//! discover_files ──► bounded worker pool (JoinSet, scan.workers)
//!                         │
//!                         ▼ per file
//!   read ─► should_analyze ─► unchanged? done
//!                         │
//!                         ▼
//!   Window::initial ─► enumerate ─► per candidate: engine (+ enlarge retry)
//!        │                                   │
//!        │                                   └─► Store::replace_function
//!        └─ slide(step) until end == total
//!                         │
//!                         ▼
//!   Store::complete_scan (only when nothing failed transiently)
//! ```
//!
//! Files are independent once their fingerprint check has run, so they are
//! spread over workers. Windows within a file and turns within a candidate
//! stay strictly sequential.
//!
//! Backend failures and malformed answers are contained at the candidate or
//! window that produced them. Only [`AnalysisError::is_fatal`] errors stop
//! the run: in-flight files finish, no new file is started.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::change::should_analyze;
use crate::completion::{create_backend, CompletionBackend};
use crate::config::{Config, ScanConfig};
use crate::engine::{CandidateOutcome, Engine, ExtractedFunction, Rejection};
use crate::error::AnalysisError;
use crate::models::FunctionRecord;
use crate::progress::{FileOutcome, ProgressMode, ScanProgressEvent, ScanProgressReporter};
use crate::store::{SqliteStore, Store};
use crate::walker::{discover_files, Language};
use crate::window::Window;

/// What happened to one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileReport {
    /// Fingerprint matched a finished scan; nothing else ran.
    pub unchanged: bool,
    /// Every window and candidate finished without a transient failure.
    pub complete: bool,
    pub windows: u64,
    pub windows_failed: u64,
    /// Names persisted in this pass, first occurrence order.
    pub saved: Vec<String>,
    pub rejected: u64,
    pub failed: u64,
    pub tokens: u64,
}

/// Totals for one `analyze_directory` run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub files: u64,
    pub files_analyzed: u64,
    pub files_unchanged: u64,
    pub files_failed: u64,
    /// Analyzed files left flagged for rescan after a transient failure.
    pub files_incomplete: u64,
    pub windows: u64,
    pub windows_failed: u64,
    pub functions_saved: u64,
    pub candidates_rejected: u64,
    pub candidates_failed: u64,
    pub tokens: u64,
}

impl ScanSummary {
    fn absorb(&mut self, report: &FileReport) {
        if report.unchanged {
            self.files_unchanged += 1;
            return;
        }
        self.files_analyzed += 1;
        if !report.complete {
            self.files_incomplete += 1;
        }
        self.windows += report.windows;
        self.windows_failed += report.windows_failed;
        self.functions_saved += report.saved.len() as u64;
        self.candidates_rejected += report.rejected;
        self.candidates_failed += report.failed;
        self.tokens += report.tokens;
    }
}

/// Runs the pipeline against an explicit store and backend handle.
#[derive(Clone)]
pub struct Analyzer {
    store: Arc<dyn Store>,
    backend: Arc<dyn CompletionBackend>,
    scan: ScanConfig,
    deadline: Duration,
}

impl Analyzer {
    pub fn new(
        store: Arc<dyn Store>,
        backend: Arc<dyn CompletionBackend>,
        scan: ScanConfig,
        deadline: Duration,
    ) -> Self {
        Self {
            store,
            backend,
            scan,
            deadline,
        }
    }

    pub fn from_config(
        store: Arc<dyn Store>,
        backend: Arc<dyn CompletionBackend>,
        config: &Config,
    ) -> Self {
        Self::new(store, backend, config.scan.clone(), config.backend.timeout())
    }

    /// Analyze every matching file under `root`.
    pub async fn analyze_directory(
        &self,
        root: &Path,
        progress: &dyn ScanProgressReporter,
    ) -> Result<ScanSummary, AnalysisError> {
        let files = discover_files(root, &self.scan)?;
        let total = files.len() as u64;
        progress.report(ScanProgressEvent::Discovered {
            root: root.display().to_string(),
            total,
        });
        info!(root = %root.display(), files = total, "starting scan");

        let mut summary = ScanSummary {
            files: total,
            ..ScanSummary::default()
        };
        let workers = self.scan.workers.max(1);
        let mut pending = files.into_iter();
        let mut tasks: JoinSet<(PathBuf, Result<FileReport, AnalysisError>)> = JoinSet::new();
        let mut fatal: Option<AnalysisError> = None;
        let mut done = 0u64;

        loop {
            while fatal.is_none() && tasks.len() < workers {
                let Some(path) = pending.next() else { break };
                let analyzer = self.clone();
                tasks.spawn(async move {
                    let result = analyzer.analyze_file(&path).await;
                    (path, result)
                });
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            done += 1;

            let (path, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "file worker did not finish");
                    summary.files_failed += 1;
                    continue;
                }
            };

            let outcome = match result {
                Ok(report) => {
                    summary.absorb(&report);
                    if report.unchanged {
                        FileOutcome::Unchanged
                    } else {
                        FileOutcome::Analyzed
                    }
                }
                Err(e) if e.is_fatal() => {
                    error!(path = %path.display(), error = %e, "aborting scan");
                    summary.files_failed += 1;
                    fatal.get_or_insert(e);
                    FileOutcome::Failed
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping file");
                    summary.files_failed += 1;
                    FileOutcome::Failed
                }
            };
            progress.report(ScanProgressEvent::File {
                path: path.display().to_string(),
                outcome,
                n: done,
                total,
            });
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    /// Analyze a single file, gated on its fingerprint.
    pub async fn analyze_file(&self, path: &Path) -> Result<FileReport, AnalysisError> {
        let lines = read_lines(path).await?;
        let key = path.to_string_lossy();

        let decision = should_analyze(self.store.as_ref(), &key, &lines).await?;
        if decision.skip() {
            debug!(path = %key, "unchanged");
            return Ok(FileReport {
                unchanged: true,
                complete: true,
                ..FileReport::default()
            });
        }
        let file_id = decision.file_id();

        let engine = Engine::new(self.backend.as_ref(), Language::from_path(path), self.deadline);
        let step = self.scan.step_size.max(1);
        let mut report = FileReport::default();
        let mut window = Window::initial(lines.len(), step);

        loop {
            if !window.is_empty() {
                self.analyze_window(&engine, file_id, &lines, &window, &mut report)
                    .await?;
            }
            if window.reaches_end() {
                break;
            }
            window.slide(step);
        }

        report.tokens = engine.tokens_used();
        report.complete = report.windows_failed == 0 && report.failed == 0;
        if report.complete {
            self.store
                .complete_scan(file_id, &report.saved, Utc::now())
                .await
                .map_err(AnalysisError::store)?;
        } else {
            warn!(
                path = %key,
                windows_failed = report.windows_failed,
                candidates_failed = report.failed,
                "scan incomplete; file stays flagged for rescan"
            );
        }

        info!(
            path = %key,
            windows = report.windows,
            saved = report.saved.len(),
            rejected = report.rejected,
            tokens = report.tokens,
            "analyzed"
        );
        Ok(report)
    }

    async fn analyze_window(
        &self,
        engine: &Engine<'_>,
        file_id: i64,
        lines: &[String],
        window: &Window,
        report: &mut FileReport,
    ) -> Result<(), AnalysisError> {
        report.windows += 1;

        let names = match engine.enumerate(lines, window).await {
            Ok(names) => names,
            Err(e) => {
                warn!(start = window.start(), end = window.end(), error = %e, "window skipped");
                report.windows_failed += 1;
                return Ok(());
            }
        };
        debug!(start = window.start(), end = window.end(), candidates = ?names, "enumerated");

        for name in &names {
            let extracted = match self.resolve_candidate(engine, name, lines, window).await {
                Ok(Some(extracted)) => extracted,
                Ok(None) => {
                    report.rejected += 1;
                    continue;
                }
                Err(e) => {
                    warn!(candidate = %name, error = %e, "candidate skipped");
                    report.failed += 1;
                    continue;
                }
            };

            let record = FunctionRecord::new(
                file_id,
                &extracted.name,
                extracted.info,
                extracted.span.line_start(),
                extracted.span.line_end(),
            );
            self.store
                .replace_function(file_id, &record)
                .await
                .map_err(AnalysisError::store)?;
            if !report.saved.contains(&record.name) {
                report.saved.push(record.name);
            }
        }
        Ok(())
    }

    /// Run one candidate, growing a copy of `window` while the body does not fit.
    async fn resolve_candidate(
        &self,
        engine: &Engine<'_>,
        name: &str,
        lines: &[String],
        window: &Window,
    ) -> Result<Option<ExtractedFunction>, AnalysisError> {
        let mut attempt = *window;
        let mut enlargements = 0u32;

        loop {
            match engine.analyze_candidate(name, lines, &attempt).await? {
                CandidateOutcome::Accepted(extracted) => return Ok(Some(extracted)),
                CandidateOutcome::Rejected(Rejection::NotContained)
                    if enlargements < self.scan.enlarge_retries && !attempt.reaches_end() =>
                {
                    enlargements += 1;
                    attempt = attempt.enlarged(self.scan.step_size.max(1));
                    debug!(candidate = name, end = attempt.end(), "retrying on enlarged window");
                }
                CandidateOutcome::Rejected(rejection) => {
                    debug!(candidate = name, ?rejection, "rejected");
                    return Ok(None);
                }
            }
        }
    }
}

async fn read_lines(path: &Path) -> Result<Vec<String>, AnalysisError> {
    match tokio::fs::read(path).await {
        // Stray non-UTF-8 bytes (Latin-1 comments and the like) are replaced,
        // the file is still analyzed.
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(AnalysisError::NotFound(path.to_path_buf()))
        }
        Err(e) => Err(AnalysisError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// `atlas scan [DIR]`: scan into the configured SQLite database.
pub async fn run_scan(config: &Config, dir: Option<&Path>, mode: ProgressMode) -> Result<()> {
    let root = match dir.or(config.scan.root.as_deref()) {
        Some(root) => root.to_path_buf(),
        None => bail!("No directory given and [scan] root is not set in the config"),
    };

    let store = SqliteStore::open(config).await?;
    let backend = create_backend(&config.backend)?;
    let model = backend.model_name().to_string();
    let analyzer = Analyzer::from_config(Arc::new(store.clone()), backend, config);

    let reporter = mode.reporter();
    let result = analyzer.analyze_directory(&root, reporter.as_ref()).await;
    store.close().await;
    let summary = result?;

    print_summary(&root, &model, &summary);
    Ok(())
}

pub fn print_summary(root: &Path, model: &str, summary: &ScanSummary) {
    println!("scan {}", root.display());
    println!("  model: {}", model);
    println!("  files found: {}", summary.files);
    println!("  files analyzed: {}", summary.files_analyzed);
    println!("  files unchanged: {}", summary.files_unchanged);
    if summary.files_failed > 0 {
        println!("  files skipped: {}", summary.files_failed);
    }
    if summary.files_incomplete > 0 {
        println!("  files to retry: {}", summary.files_incomplete);
    }
    println!(
        "  windows: {} ({} failed)",
        summary.windows, summary.windows_failed
    );
    println!("  functions saved: {}", summary.functions_saved);
    println!("  candidates rejected: {}", summary.candidates_rejected);
    println!("  candidates failed: {}", summary.candidates_failed);
    println!("  tokens: {}", summary.tokens);
    println!("ok");
}
