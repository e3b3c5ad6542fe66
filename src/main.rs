//! # Code Atlas CLI (`atlas`)
//!
//! ## Usage
//!
//! ```bash
//! atlas --config ./config/atlas.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `atlas init` | Create the SQLite database and schema |
//! | `atlas scan [DIR]` | Discover and describe functions under a directory |
//! | `atlas files` | List scanned files and their scan state |
//! | `atlas functions` | List stored functions, optionally for one file |
//!
//! ## Examples
//!
//! ```bash
//! # Scan a project with a local Ollama model
//! atlas scan ~/src/project --config ./config/atlas.toml
//!
//! # Functions of one file, as JSON
//! atlas functions --file /home/me/src/project/main.go --json
//!
//! # Debug logging for the pipeline
//! ATLAS_LOG=code_atlas=debug atlas scan
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use code_atlas::config::{self, Config};
use code_atlas::progress::ProgressMode;
use code_atlas::{analyze, list, logging, migrate};

/// Code Atlas: incremental, LLM-driven function discovery for source trees.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/atlas.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "atlas",
    about = "Code Atlas: incremental, LLM-driven function discovery for source trees",
    version,
    long_about = "Code Atlas walks a source tree, shows each changed file to a language model \
    window by window, and stores every confirmed function with its signature, arguments, \
    return type and purpose in SQLite. Unchanged files are skipped by content fingerprint."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/atlas.toml`. `init`, `files` and `functions`
    /// fall back to built-in defaults when the file does not exist.
    #[arg(long, global = true, default_value = "./config/atlas.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file with the `files` and `functions`
    /// tables. Idempotent.
    Init,

    /// Scan a directory.
    ///
    /// Every matching file whose content changed since the last completed
    /// scan is analyzed; results replace earlier rows for the same function.
    Scan {
        /// Directory to scan. Defaults to `[scan] root` from the config.
        dir: Option<PathBuf>,

        /// Progress on stderr: `off`, `human` or `json`. Defaults to human
        /// on a terminal, off otherwise.
        #[arg(long)]
        progress: Option<String>,
    },

    /// List scanned files.
    Files {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// List stored functions.
    Functions {
        /// Only functions of this file (path as stored, i.e. absolute).
        #[arg(long)]
        file: Option<String>,

        /// Print JSON instead of text blocks.
        #[arg(long)]
        json: bool,
    },
}

/// Commands that only need a database path work without a config file.
fn load_or_minimal(path: &Path) -> Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        Ok(Config::minimal())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let cfg = load_or_minimal(&cli.config)?;
            migrate::run_migrations(&cfg).await?;
            println!("init {}", cfg.db.path.display());
            println!("ok");
        }
        Commands::Scan { dir, progress } => {
            let cfg = config::load_config(&cli.config)?;
            let mode = ProgressMode::from_flag(progress.as_deref()).map_err(anyhow::Error::msg)?;
            analyze::run_scan(&cfg, dir.as_deref(), mode).await?;
        }
        Commands::Files { json } => {
            let cfg = load_or_minimal(&cli.config)?;
            list::list_files(&cfg, json).await?;
        }
        Commands::Functions { file, json } => {
            let cfg = load_or_minimal(&cli.config)?;
            list::list_functions(&cfg, file.as_deref(), json).await?;
        }
    }

    Ok(())
}
