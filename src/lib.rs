//! # Code Atlas
//!
//! Incremental, LLM-driven function discovery for source trees.
//!
//! Code Atlas walks a directory, skips files whose content fingerprint has not
//! changed since their last completed scan, and shows every other file to a
//! text-completion backend one line window at a time. For each window the
//! backend lists candidate functions; each candidate is then located,
//! checked for completeness and described in a short conversation. Confirmed
//! functions are stored with signature, arguments, return type, purpose and
//! line range.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌────────────┐   ┌──────────┐
//! │  walker  │──▶│    change    │──▶│   window   │──▶│  engine  │
//! │  (files) │   │ (fingerprint)│   │ (line span)│   │ (stages) │
//! └──────────┘   └──────────────┘   └────────────┘   └────┬─────┘
//!                                                         │
//!                        analyze (orchestrator) ◀─────────┘
//!                                │
//!                                ▼
//!                        ┌──────────────┐
//!                        │ store (SQLite│
//!                        │  / memory)   │
//!                        └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! atlas init                    # create database
//! atlas scan ~/src/project      # analyze changed files
//! atlas functions --json        # read results back
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | Tracing subscriber setup |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`store`] | Result store trait, SQLite and in-memory implementations |
//! | [`change`] | Content fingerprint gate |
//! | [`window`] | Line windows |
//! | [`walker`] | File discovery and language detection |
//! | [`completion`] | Text-completion backends |
//! | [`transcript`] | Per-candidate conversation turns |
//! | [`decode`] | Structured answer decoders |
//! | [`prompt`] | Prompt text |
//! | [`engine`] | Staged conversational analysis |
//! | [`analyze`] | Directory orchestration and summary |
//! | [`progress`] | Scan progress on stderr |
//! | [`list`] | File and function listings |

pub mod analyze;
pub mod change;
pub mod completion;
pub mod config;
pub mod db;
pub mod decode;
pub mod engine;
pub mod error;
pub mod list;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod prompt;
pub mod store;
pub mod transcript;
pub mod walker;
pub mod window;

pub use analyze::{Analyzer, FileReport, ScanSummary};
pub use completion::{Completion, CompletionBackend};
pub use error::{AnalysisError, CompletionError};
pub use store::{InMemoryStore, SqliteStore, Store};
