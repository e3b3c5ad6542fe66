//! Source file discovery.
//!
//! Walks a root directory recursively and yields absolute paths whose
//! extension is in the configured allow-list. Version-control and build
//! directories are excluded by default.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use crate::config::ScanConfig;
use crate::error::AnalysisError;

/// Source language label, derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Cpp,
    JavaScript,
    TypeScript,
    Go,
    Java,
    Python,
    Unknown,
}

impl Language {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "cpp" | "h" | "hpp" => Language::Cpp,
            "js" => Language::JavaScript,
            "ts" => Language::TypeScript,
            "go" => Language::Go,
            "java" => Language::Java,
            "py" => Language::Python,
            _ => Language::Unknown,
        }
    }

    /// Name used in code fences and prompt instructions.
    pub fn label(&self) -> &'static str {
        match self {
            Language::Cpp => "cpp",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Go => "golang",
            Language::Java => "java",
            Language::Python => "python",
            Language::Unknown => "unknown",
        }
    }
}

/// List matching files under `root`, sorted.
///
/// Only a failure on `root` itself is an error; unreadable entries below it
/// are logged and skipped.
pub fn discover_files(root: &Path, config: &ScanConfig) -> Result<Vec<PathBuf>, AnalysisError> {
    let walk_err = |reason: String| AnalysisError::Walk {
        root: root.to_path_buf(),
        reason,
    };

    let root = root
        .canonicalize()
        .map_err(|e| walk_err(e.to_string()))?;
    if !root.is_dir() {
        return Err(walk_err("not a directory".to_string()));
    }

    let mut excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes).map_err(|e| walk_err(e.to_string()))?;

    let allowed: Vec<String> = config
        .extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .collect();

    let mut files = Vec::new();
    let walker = WalkDir::new(&root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(walk_err(e.to_string())),
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(&root).unwrap_or(path);
        if exclude_set.is_match(relative) {
            continue;
        }

        let ext_ok = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .is_some_and(|e| allowed.contains(&e));
        if ext_ok {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    builder.build()
}
