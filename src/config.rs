//! Configuration file and filter term loading.
//!
//! [`Config::load`] reads `$XDG_CONFIG_HOME/adbscope/config.toml` (or an
//! explicit path). A missing file yields the built-in defaults; command line
//! flags are layered on top by the caller.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level configuration from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Path to the `adb` binary
    pub adb_path: Option<String>,
    /// Minimum severity letter (V, D, I, W, E, F)
    pub min_level: Option<String>,
    pub show_time: bool,
    pub show_pid: bool,
    /// Keep ANSI styling in the log file
    pub log_file_ansi: bool,
    pub watcher: WatcherSection,
}

/// `[watcher]` section of `config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatcherSection {
    pub poll_interval_ms: u64,
    pub query_timeout_secs: u64,
    /// Abort the run when a package cannot be resolved
    pub fail_fast: bool,
}

impl Default for WatcherSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            query_timeout_secs: 10,
            fail_fast: false,
        }
    }
}

impl WatcherSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs.max(1))
    }
}

impl Config {
    /// Load `path`, or the default location when `None`.
    ///
    /// An explicitly given path must exist; the default location may not.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match default_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };

        if !required && !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::parse(&text)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// `$XDG_CONFIG_HOME/adbscope/config.toml`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("adbscope").join("config.toml"))
}

// ---------------------------------------------------------------------------
// Filter terms
// ---------------------------------------------------------------------------

/// Expand raw `--include`/`--exclude` values into filter terms.
///
/// Each value may hold several comma-separated terms. A value starting with
/// `@` names a file holding one term per line. Terms of one character or
/// less are dropped.
pub fn expand_terms(values: &[String]) -> Result<Vec<String>> {
    let mut terms = Vec::new();

    for value in values {
        if let Some(file) = value.strip_prefix('@') {
            let text = std::fs::read_to_string(file)
                .with_context(|| format!("failed to read filter term file {file}"))?;
            terms.extend(text.lines().filter_map(keep_term));
        } else {
            terms.extend(value.split(',').filter_map(keep_term));
        }
    }

    Ok(terms)
}

fn keep_term(term: &str) -> Option<String> {
    let term = term.trim();
    (term.chars().count() > 1).then(|| term.to_string())
}
