//! In-memory [`Store`] for tests and throwaway runs.
//!
//! A single `RwLock` guards both tables so every operation is atomic with
//! respect to the others.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{FunctionListing, FunctionRecord, SourceFile};

use super::Store;

#[derive(Default)]
struct Tables {
    files: HashMap<String, SourceFile>,
    functions: Vec<(i64, FunctionRecord)>,
    next_file_id: i64,
    next_function_id: i64,
}

pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    /// Rows currently stored for `file_id`, in insertion order.
    pub fn functions_for(&self, file_id: i64) -> Vec<FunctionRecord> {
        match self.tables.read() {
            Ok(t) => t
                .functions
                .iter()
                .filter(|(_, r)| r.file_id == file_id)
                .map(|(_, r)| r.clone())
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_file_by_path(&self, path: &str) -> Result<Option<SourceFile>> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables.files.get(path).cloned())
    }

    async fn upsert_file(
        &self,
        path: &str,
        fingerprint: &str,
        scanned_at: DateTime<Utc>,
    ) -> Result<i64> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        if let Some(existing) = tables.files.get_mut(path) {
            existing.fingerprint = fingerprint.to_string();
            existing.last_scan_time = scanned_at;
            existing.rescan_required = true;
            return Ok(existing.id);
        }

        tables.next_file_id += 1;
        let id = tables.next_file_id;
        tables.files.insert(
            path.to_string(),
            SourceFile {
                id,
                path: path.to_string(),
                fingerprint: fingerprint.to_string(),
                last_scan_time: scanned_at,
                rescan_required: true,
            },
        );
        Ok(id)
    }

    async fn replace_function(&self, file_id: i64, record: &FunctionRecord) -> Result<()> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        if !tables.files.values().any(|f| f.id == file_id) {
            bail!("unknown file id {}", file_id);
        }
        tables
            .functions
            .retain(|(_, r)| !(r.file_id == file_id && r.name == record.name));
        tables.next_function_id += 1;
        let id = tables.next_function_id;
        let mut stored = record.clone();
        stored.file_id = file_id;
        tables.functions.push((id, stored));
        Ok(())
    }

    async fn complete_scan(
        &self,
        file_id: i64,
        kept: &[String],
        scanned_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        tables
            .functions
            .retain(|(_, r)| r.file_id != file_id || kept.contains(&r.name));
        let file = tables
            .files
            .values_mut()
            .find(|f| f.id == file_id)
            .ok_or_else(|| anyhow!("unknown file id {}", file_id))?;
        file.rescan_required = false;
        file.last_scan_time = scanned_at;
        Ok(())
    }

    async fn list_files(&self) -> Result<Vec<SourceFile>> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        let mut files: Vec<SourceFile> = tables.files.values().cloned().collect();
        files.sort_by_key(|f| f.id);
        Ok(files)
    }

    async fn list_functions(&self, path: Option<&str>) -> Result<Vec<FunctionListing>> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        let mut rows: Vec<FunctionListing> = tables
            .functions
            .iter()
            .filter_map(|(id, record)| {
                let file = tables.files.values().find(|f| f.id == record.file_id)?;
                if path.is_some_and(|p| p != file.path) {
                    return None;
                }
                Some(FunctionListing {
                    id: *id,
                    path: file.path.clone(),
                    record: record.clone(),
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            a.path
                .cmp(&b.path)
                .then(a.record.line_start.cmp(&b.record.line_start))
        });
        Ok(rows)
    }
}
