//! Content-hash change detection.
//!
//! A file is re-analyzed only when its SHA-256 fingerprint differs from the
//! stored one, or when its previous scan never completed. Model calls are the
//! dominant cost, so this gate runs before anything else touches a file.

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::error::AnalysisError;
use crate::store::Store;

/// Outcome of [`should_analyze`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeDecision {
    /// Stored fingerprint matches and the last scan finished; do nothing.
    Unchanged { file_id: i64, fingerprint: String },
    /// The file row has been upserted with the new fingerprint.
    Changed { file_id: i64, fingerprint: String },
}

impl ChangeDecision {
    pub fn skip(&self) -> bool {
        matches!(self, ChangeDecision::Unchanged { .. })
    }

    pub fn file_id(&self) -> i64 {
        match self {
            ChangeDecision::Unchanged { file_id, .. } | ChangeDecision::Changed { file_id, .. } => {
                *file_id
            }
        }
    }

    pub fn fingerprint(&self) -> &str {
        match self {
            ChangeDecision::Unchanged { fingerprint, .. }
            | ChangeDecision::Changed { fingerprint, .. } => fingerprint,
        }
    }
}

/// Hex SHA-256 over the lines joined with `\n`.
pub fn fingerprint(lines: &[String]) -> String {
    let mut hasher = Sha256::new();
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\n");
        }
        hasher.update(line.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Compare `lines` against the stored fingerprint for `path`.
///
/// On change the file row is upserted (which also flags it as mid-scan) and
/// its id is returned for use on function records. Store failures are fatal.
pub async fn should_analyze(
    store: &dyn Store,
    path: &str,
    lines: &[String],
) -> Result<ChangeDecision, AnalysisError> {
    let fingerprint = fingerprint(lines);

    let existing = store
        .get_file_by_path(path)
        .await
        .map_err(AnalysisError::store)?;

    if let Some(file) = existing {
        if file.fingerprint == fingerprint && !file.rescan_required {
            return Ok(ChangeDecision::Unchanged {
                file_id: file.id,
                fingerprint,
            });
        }
    }

    let file_id = store
        .upsert_file(path, &fingerprint, Utc::now())
        .await
        .map_err(AnalysisError::store)?;

    Ok(ChangeDecision::Changed {
        file_id,
        fingerprint,
    })
}
