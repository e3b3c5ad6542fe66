//! SQLite-backed [`Store`].
//!
//! Every write that touches more than one row runs inside a transaction, so
//! a crash can never leave both a stale and a fresh row for one function.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::{FunctionListing, FunctionRecord, SourceFile};

use super::Store;

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect using `[db] path` and make sure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn ts_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

fn row_to_file(row: &SqliteRow) -> SourceFile {
    SourceFile {
        id: row.get("id"),
        path: row.get("path"),
        fingerprint: row.get("content_fingerprint"),
        last_scan_time: ts_to_datetime(row.get("last_scan_time")),
        rescan_required: row.get::<i64, _>("rescan_required") != 0,
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_file_by_path(&self, path: &str) -> Result<Option<SourceFile>> {
        let row = sqlx::query(
            "SELECT id, path, content_fingerprint, last_scan_time, rescan_required FROM files WHERE path = ? LIMIT 1",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_file))
    }

    async fn upsert_file(
        &self,
        path: &str,
        fingerprint: &str,
        scanned_at: DateTime<Utc>,
    ) -> Result<i64> {
        sqlx::query(
            r#"
            INSERT INTO files (path, content_fingerprint, last_scan_time, rescan_required)
            VALUES (?, ?, ?, 1)
            ON CONFLICT(path) DO UPDATE SET
                content_fingerprint = excluded.content_fingerprint,
                last_scan_time = excluded.last_scan_time,
                rescan_required = 1
            "#,
        )
        .bind(path)
        .bind(fingerprint)
        .bind(scanned_at.timestamp())
        .execute(&self.pool)
        .await?;

        let id: i64 = sqlx::query_scalar("SELECT id FROM files WHERE path = ?")
            .bind(path)
            .fetch_one(&self.pool)
            .await?;

        Ok(id)
    }

    async fn replace_function(&self, file_id: i64, record: &FunctionRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM functions WHERE file_id = ? AND name = ?")
            .bind(file_id)
            .bind(&record.name)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO functions (name, signature, arguments, return_type, namespace,
                                   description, file_id, line_start, line_end)
            VALUES (?, ?, ?, ?, NULL, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.name)
        .bind(&record.signature)
        .bind(&record.arguments)
        .bind(&record.return_type)
        .bind(&record.description)
        .bind(file_id)
        .bind(record.line_start)
        .bind(record.line_end)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn complete_scan(
        &self,
        file_id: i64,
        kept: &[String],
        scanned_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Write first: a deferred transaction that reads before writing
        // cannot upgrade its lock once another worker has committed.
        sqlx::query("UPDATE files SET rescan_required = 0, last_scan_time = ? WHERE id = ?")
            .bind(scanned_at.timestamp())
            .bind(file_id)
            .execute(&mut *tx)
            .await?;

        let existing: Vec<String> = sqlx::query_scalar("SELECT name FROM functions WHERE file_id = ?")
            .bind(file_id)
            .fetch_all(&mut *tx)
            .await?;

        for name in existing.iter().filter(|n| !kept.contains(n)) {
            sqlx::query("DELETE FROM functions WHERE file_id = ? AND name = ?")
                .bind(file_id)
                .bind(name)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_files(&self) -> Result<Vec<SourceFile>> {
        let rows = sqlx::query(
            "SELECT id, path, content_fingerprint, last_scan_time, rescan_required FROM files ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_file).collect())
    }

    async fn list_functions(&self, path: Option<&str>) -> Result<Vec<FunctionListing>> {
        let rows = sqlx::query(
            r#"
            SELECT f.id, f.name, f.signature, f.arguments, f.return_type, f.description,
                   f.file_id, f.line_start, f.line_end, s.path
            FROM functions f
            JOIN files s ON f.file_id = s.id
            WHERE (?1 IS NULL OR s.path = ?1)
            ORDER BY s.path ASC, f.line_start ASC
            "#,
        )
        .bind(path)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| FunctionListing {
                id: row.get("id"),
                path: row.get("path"),
                record: FunctionRecord {
                    file_id: row.get("file_id"),
                    name: row.get("name"),
                    signature: row.get("signature"),
                    arguments: row.get("arguments"),
                    return_type: row.get("return_type"),
                    description: row.get("description"),
                    line_start: row.get("line_start"),
                    line_end: row.get("line_end"),
                },
            })
            .collect())
    }
}
