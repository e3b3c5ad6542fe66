//! Core data models.
//!
//! [`SourceFile`] and [`FunctionRecord`] are owned by the store; the engine
//! only produces [`FunctionInfo`] values and line bounds that the
//! orchestrator turns into records.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A file row as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceFile {
    pub id: i64,
    pub path: String,
    /// Hex SHA-256 of the newline-joined file content.
    pub fingerprint: String,
    pub last_scan_time: DateTime<Utc>,
    /// Set when a scan started but did not finish cleanly.
    pub rescan_required: bool,
}

/// Structured answer of the extraction stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionInfo {
    pub purpose: String,
    pub signature: String,
    pub arguments: String,
    pub return_type: String,
}

/// One function as persisted for a file. `(file_id, name)` is the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionRecord {
    pub file_id: i64,
    pub name: String,
    pub signature: String,
    pub arguments: String,
    pub return_type: String,
    pub description: String,
    /// 1-based, inclusive.
    pub line_start: i64,
    /// 1-based, inclusive.
    pub line_end: i64,
}

impl FunctionRecord {
    pub fn new(file_id: i64, name: &str, info: FunctionInfo, line_start: i64, line_end: i64) -> Self {
        Self {
            file_id,
            name: name.to_string(),
            signature: info.signature,
            arguments: info.arguments,
            return_type: info.return_type,
            description: info.purpose,
            line_start,
            line_end,
        }
    }
}

/// A function row joined with its file path, for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionListing {
    pub id: i64,
    pub path: String,
    #[serde(flatten)]
    pub record: FunctionRecord,
}
