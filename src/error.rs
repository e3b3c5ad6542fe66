//! Error taxonomy for the analysis pipeline.
//!
//! Only [`AnalysisError::StoreUnavailable`] and [`AnalysisError::Walk`] abort
//! a directory scan. Everything else is contained at the candidate, window or
//! file that produced it.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single text-completion request.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("backend returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("invalid backend response: {0}")]
    InvalidResponse(String),
}

/// A structured stage answer that could not be decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("no JSON value found in response")]
    NoJson,
    #[error("JSON does not match the expected shape: {0}")]
    Json(#[from] serde_json::Error),
}

/// Logical step of the candidate pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Enumerate,
    Locate,
    Verify,
    Extract,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Enumerate => "enumerate",
            Stage::Locate => "locate",
            Stage::Verify => "verify",
            Stage::Extract => "extract",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Timeout or connection failure talking to the completion backend.
    #[error("completion request failed: {0}")]
    Backend(#[from] CompletionError),

    #[error("malformed {stage} response: {source}")]
    MalformedResponse {
        stage: Stage,
        #[source]
        source: DecodeError,
    },

    /// The file vanished between discovery and read.
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store unavailable: {0:#}")]
    StoreUnavailable(anyhow::Error),

    /// The scan root itself could not be walked.
    #[error("cannot walk {}: {reason}", .root.display())]
    Walk { root: PathBuf, reason: String },
}

impl AnalysisError {
    pub fn store(err: anyhow::Error) -> Self {
        AnalysisError::StoreUnavailable(err)
    }

    /// Errors that end the whole run rather than one file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AnalysisError::StoreUnavailable(_) | AnalysisError::Walk { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_store_and_walk_are_fatal() {
        assert!(AnalysisError::store(anyhow::anyhow!("disk gone")).is_fatal());
        assert!(AnalysisError::Walk {
            root: PathBuf::from("/x"),
            reason: "denied".into()
        }
        .is_fatal());
        assert!(!AnalysisError::NotFound(PathBuf::from("/x/a.go")).is_fatal());
        assert!(!AnalysisError::Backend(CompletionError::Connection("refused".into())).is_fatal());
        assert!(!AnalysisError::MalformedResponse {
            stage: Stage::Verify,
            source: DecodeError::NoJson,
        }
        .is_fatal());
    }

    #[test]
    fn stage_display() {
        assert_eq!(Stage::Locate.to_string(), "locate");
        let err = AnalysisError::MalformedResponse {
            stage: Stage::Extract,
            source: DecodeError::NoJson,
        };
        assert!(err.to_string().starts_with("malformed extract response"));
    }
}
