//! `atlas files` and `atlas functions`: read back what scans stored.

use anyhow::Result;

use crate::config::Config;
use crate::models::{FunctionListing, SourceFile};
use crate::store::{SqliteStore, Store};

pub async fn list_files(config: &Config, json: bool) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let files = store.list_files().await;
    store.close().await;
    let files = files?;

    if json {
        println!("{}", serde_json::to_string_pretty(&files)?);
    } else {
        print!("{}", render_files(&files));
    }
    Ok(())
}

pub async fn list_functions(config: &Config, file: Option<&str>, json: bool) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let functions = store.list_functions(file).await;
    store.close().await;
    let functions = functions?;

    if json {
        println!("{}", serde_json::to_string_pretty(&functions)?);
    } else {
        print!("{}", render_functions(&functions));
    }
    Ok(())
}

fn render_files(files: &[SourceFile]) -> String {
    let mut out = format!("{:<6} {:<8} {:<20} PATH\n", "ID", "STATUS", "LAST SCAN");
    for f in files {
        let status = if f.rescan_required { "pending" } else { "done" };
        out.push_str(&format!(
            "{:<6} {:<8} {:<20} {}\n",
            f.id,
            status,
            f.last_scan_time.format("%Y-%m-%d %H:%M:%S"),
            f.path
        ));
    }
    out
}

fn render_functions(functions: &[FunctionListing]) -> String {
    let mut out = String::new();
    for f in functions {
        let r = &f.record;
        out.push_str(&format!("{}:{}-{}  {}\n", f.path, r.line_start, r.line_end, r.name));
        out.push_str(&format!("  signature: {}\n", r.signature));
        if !r.arguments.is_empty() {
            out.push_str(&format!("  arguments: {}\n", r.arguments));
        }
        if !r.return_type.is_empty() {
            out.push_str(&format!("  returns: {}\n", r.return_type));
        }
        out.push_str(&format!("  purpose: {}\n", r.description));
    }
    if functions.is_empty() {
        out.push_str("no functions\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FunctionRecord;
    use chrono::{TimeZone, Utc};

    #[test]
    fn files_table() {
        let files = vec![SourceFile {
            id: 7,
            path: "/src/a.go".into(),
            fingerprint: "ab".into(),
            last_scan_time: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            rescan_required: true,
        }];
        let text = render_files(&files);
        assert!(text.starts_with("ID"));
        assert!(text.contains("pending"));
        assert!(text.contains("2024-05-01 12:00:00"));
        assert!(text.ends_with("/src/a.go\n"));
    }

    #[test]
    fn function_block() {
        let listing = FunctionListing {
            id: 1,
            path: "/src/a.go".into(),
            record: FunctionRecord {
                file_id: 7,
                name: "foo".into(),
                signature: "func foo(a,b int) int".into(),
                arguments: "a, b: int".into(),
                return_type: String::new(),
                description: "adds two numbers".into(),
                line_start: 1,
                line_end: 3,
            },
        };
        let text = render_functions(&[listing]);
        assert!(text.starts_with("/src/a.go:1-3  foo\n"));
        assert!(text.contains("  arguments: a, b: int\n"));
        assert!(!text.contains("returns"));
        assert_eq!(render_functions(&[]), "no functions\n");
    }
}
