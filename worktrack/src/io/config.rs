//! Tracker configuration stored under `.worktrack/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::process::ProbeLimits;

/// Tracker configuration (TOML).
///
/// Missing fields default to values that work for a typical source repo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TrackerConfig {
    /// Wall-clock budget for each version-control probe invocation.
    pub probe_timeout_secs: u64,

    /// Bound on captured probe stdout/stderr.
    pub probe_output_limit_bytes: usize,

    pub fingerprint: FingerprintConfig,

    pub events: EventsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FingerprintConfig {
    /// File extensions (without the dot) considered source-like.
    pub extensions: Vec<String>,

    /// Directory names never descended into.
    pub excluded_dirs: Vec<String>,

    /// Files larger than this are skipped.
    pub max_file_bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EventsConfig {
    /// Append unit/container notifications to this JSONL file when set.
    pub path: Option<PathBuf>,
}

const DEFAULT_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "rs", "go", "java", "kt", "rb", "php", "c", "h",
    "cc", "cpp", "hpp", "cs", "swift", "json", "yaml", "yml", "toml", "md", "css", "scss", "html",
    "sql", "sh",
];

const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "dist",
    "build",
    "out",
    ".next",
    "vendor",
    "__pycache__",
    ".venv",
    "venv",
    "coverage",
    ".worktrack",
];

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            excluded_dirs: DEFAULT_EXCLUDED_DIRS.iter().map(|s| s.to_string()).collect(),
            max_file_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: 30,
            probe_output_limit_bytes: 8 * 1024 * 1024,
            fingerprint: FingerprintConfig::default(),
            events: EventsConfig::default(),
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.probe_timeout_secs == 0 {
            return Err(anyhow!("probe_timeout_secs must be > 0"));
        }
        if self.probe_output_limit_bytes == 0 {
            return Err(anyhow!("probe_output_limit_bytes must be > 0"));
        }
        if self.fingerprint.max_file_bytes == 0 {
            return Err(anyhow!("fingerprint.max_file_bytes must be > 0"));
        }
        if self
            .fingerprint
            .extensions
            .iter()
            .all(|ext| ext.trim().is_empty())
        {
            return Err(anyhow!("fingerprint.extensions must be a non-empty array"));
        }
        Ok(())
    }

    pub fn probe_limits(&self) -> ProbeLimits {
        ProbeLimits {
            timeout: Duration::from_secs(self.probe_timeout_secs),
            output_limit_bytes: self.probe_output_limit_bytes,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `TrackerConfig::default()`.
pub fn load_config(path: &Path) -> Result<TrackerConfig> {
    if !path.exists() {
        let cfg = TrackerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: TrackerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &TrackerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    crate::io::store::write_atomic(path, &buf)
}
