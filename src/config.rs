//! TOML configuration.
//!
//! All settings are read from a single file (default `./config/atlas.toml`).
//! Every section except `[db]` has defaults, so a minimal file is:
//!
//! ```toml
//! [db]
//! path = "./data/atlas.sqlite"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Sampling parameters sent with every completion request of one kind.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct SamplingConfig {
    pub temperature: f64,
    pub top_p: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    /// Model used for the single-prompt enumeration call. Falls back to `model`.
    #[serde(default)]
    pub enumerate_model: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_chat_sampling")]
    pub chat: SamplingConfig,
    #[serde(default = "default_generate_sampling")]
    pub generate: SamplingConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            url: None,
            model: default_model(),
            enumerate_model: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            chat: default_chat_sampling(),
            generate: default_generate_sampling(),
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn enumerate_model(&self) -> &str {
        self.enumerate_model.as_deref().unwrap_or(&self.model)
    }
}

fn default_provider() -> String {
    "ollama".to_string()
}
fn default_model() -> String {
    "mistral:instruct".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    2
}
fn default_chat_sampling() -> SamplingConfig {
    SamplingConfig {
        temperature: 0.15,
        top_p: 0.3,
    }
}
fn default_generate_sampling() -> SamplingConfig {
    SamplingConfig {
        temperature: 0.2,
        top_p: 0.4,
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Lines per window.
    #[serde(default = "default_step_size")]
    pub step_size: usize,
    /// How many times a single candidate may have its window grown.
    #[serde(default = "default_enlarge_retries")]
    pub enlarge_retries: u32,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            root: None,
            extensions: default_extensions(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            step_size: default_step_size(),
            enlarge_retries: default_enlarge_retries(),
            workers: default_workers(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    [".go", ".h", ".cpp", ".hpp", ".js", ".ts", ".py", ".java"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_step_size() -> usize {
    100
}
fn default_enlarge_retries() -> u32 {
    1
}
fn default_workers() -> usize {
    4
}

impl Config {
    /// Defaults with the database in `./data/atlas.sqlite`.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/atlas.sqlite"),
            },
            backend: BackendConfig::default(),
            scan: ScanConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    let scan = &config.scan;
    if scan.step_size == 0 {
        bail!("scan.step_size must be > 0");
    }
    if scan.workers == 0 {
        bail!("scan.workers must be >= 1");
    }
    if scan.extensions.is_empty() {
        bail!("scan.extensions must list at least one extension");
    }

    let backend = &config.backend;
    match backend.provider.as_str() {
        "ollama" | "openai" => {}
        other => bail!(
            "Unknown backend provider: '{}'. Must be ollama or openai.",
            other
        ),
    }
    if backend.model.trim().is_empty() {
        bail!("backend.model must not be empty");
    }
    if backend.timeout_secs == 0 {
        bail!("backend.timeout_secs must be > 0");
    }
    for (name, sampling) in [("chat", &backend.chat), ("generate", &backend.generate)] {
        if !(0.0..=2.0).contains(&sampling.temperature) {
            bail!("backend.{}.temperature must be in [0.0, 2.0]", name);
        }
        if !(sampling.top_p > 0.0 && sampling.top_p <= 1.0) {
            bail!("backend.{}.top_p must be in (0.0, 1.0]", name);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn minimal_file_gets_defaults() {
        let cfg = parse("[db]\npath = \"/tmp/a.sqlite\"\n").unwrap();
        assert_eq!(cfg.backend.provider, "ollama");
        assert_eq!(cfg.scan.step_size, 100);
        assert_eq!(cfg.scan.workers, 4);
        assert_eq!(cfg.scan.enlarge_retries, 1);
        assert!(cfg.scan.extensions.contains(&".go".to_string()));
        assert_eq!(cfg.backend.chat.temperature, 0.15);
        assert_eq!(cfg.backend.generate.top_p, 0.4);
        assert_eq!(cfg.backend.enumerate_model(), "mistral:instruct");
    }

    #[test]
    fn example_config_is_valid() {
        let cfg = parse(include_str!("../config/atlas.example.toml")).unwrap();
        assert_eq!(cfg.scan.exclude_globs, vec!["**/vendor/**".to_string()]);
        assert_eq!(cfg.backend.timeout(), Duration::from_secs(120));
    }

    #[test]
    fn enumerate_model_override() {
        let cfg = parse(
            "[db]\npath = \"a.db\"\n[backend]\nmodel = \"big\"\nenumerate_model = \"small\"\n",
        )
        .unwrap();
        assert_eq!(cfg.backend.enumerate_model(), "small");
        assert_eq!(cfg.backend.model, "big");
    }

    #[test]
    fn rejects_zero_step() {
        let err = parse("[db]\npath = \"a.db\"\n[scan]\nstep_size = 0\n").unwrap_err();
        assert!(err.to_string().contains("step_size"));
    }

    #[test]
    fn rejects_unknown_provider() {
        let err = parse("[db]\npath = \"a.db\"\n[backend]\nprovider = \"bard\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown backend provider"));
    }

    #[test]
    fn rejects_bad_top_p() {
        let err = parse(
            "[db]\npath = \"a.db\"\n[backend.chat]\ntemperature = 0.1\ntop_p = 0.0\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("top_p"));
    }
}
