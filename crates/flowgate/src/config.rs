use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use audit_log::buffer::{DEFAULT_FLUSH_INTERVAL, DEFAULT_FLUSH_THRESHOLD};
use audit_log::tailer::DEFAULT_HISTORY_LINES;
use audit_log::BufferOptions;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub viewer: ViewerConfig,
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Shared audit log location; the platform data directory when unset.
    #[serde(default)]
    pub audit_log_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            audit_log_path: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            flush_threshold: default_flush_threshold(),
            flush_interval_secs: default_flush_interval(),
        }
    }
}

impl AuditConfig {
    pub fn buffer_options(&self) -> BufferOptions {
        BufferOptions {
            flush_threshold: self.flush_threshold,
            flush_interval: Duration::from_secs(self.flush_interval_secs.max(1)),
            ..BufferOptions::default()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ViewerConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_history_lines")]
    pub history_lines: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            history_lines: default_history_lines(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default-value functions used by serde
// ---------------------------------------------------------------------------

fn default_log_level() -> String {
    "info".to_string()
}

fn default_flush_threshold() -> usize {
    DEFAULT_FLUSH_THRESHOLD
}

fn default_flush_interval() -> u64 {
    DEFAULT_FLUSH_INTERVAL.as_secs()
}

fn default_poll_interval() -> u64 {
    2
}

fn default_history_lines() -> usize {
    DEFAULT_HISTORY_LINES
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load configuration from a YAML file.
///
/// If the file does not exist a default configuration is returned and a
/// warning is emitted, so flowgate runs without any config file at all.
pub fn load(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        warn!(
            path = %path.display(),
            "configuration file not found; using defaults"
        );
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

    parse(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {e}", path.display()))
}

fn parse(yaml: &str) -> Result<Config, serde_yml::Error> {
    serde_yml::from_str(yaml)
}
