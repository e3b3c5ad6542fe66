//! Result store adapter.
//!
//! The [`Store`] trait is the only way the pipeline touches persistence. The
//! orchestrator receives it as an explicit handle; there is no process-wide
//! database state.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`get_file_by_path`](Store::get_file_by_path) | Look up a file's fingerprint and id |
//! | [`upsert_file`](Store::upsert_file) | Record a new fingerprint, mark the file as mid-scan |
//! | [`replace_function`](Store::replace_function) | Atomically delete + insert one `(file, name)` row |
//! | [`complete_scan`](Store::complete_scan) | Prune stale rows and clear the mid-scan flag |
//! | [`list_files`](Store::list_files) | All files, for listings |
//! | [`list_functions`](Store::list_functions) | Functions joined with their file path |
//!
//! Implementations must be `Send + Sync`; file workers share one handle and
//! each writes only its own file id.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{FunctionListing, FunctionRecord, SourceFile};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_file_by_path(&self, path: &str) -> Result<Option<SourceFile>>;

    /// Insert or update the file row with `fingerprint`, set
    /// `rescan_required`, and return the row id.
    async fn upsert_file(
        &self,
        path: &str,
        fingerprint: &str,
        scanned_at: DateTime<Utc>,
    ) -> Result<i64>;

    /// Delete any row for `(file_id, record.name)` and insert `record`, as one
    /// transaction.
    async fn replace_function(&self, file_id: i64, record: &FunctionRecord) -> Result<()>;

    /// Finish a clean scan: drop function rows of `file_id` whose name is not
    /// in `kept`, clear `rescan_required`, refresh `last_scan_time`.
    async fn complete_scan(
        &self,
        file_id: i64,
        kept: &[String],
        scanned_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn list_files(&self) -> Result<Vec<SourceFile>>;

    /// Functions ordered by path then start line, optionally for one path.
    async fn list_functions(&self, path: Option<&str>) -> Result<Vec<FunctionListing>>;
}
