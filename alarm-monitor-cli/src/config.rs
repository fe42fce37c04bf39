//! Configuration loading and parsing

use alarm_monitor::MonitorConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from a TOML file)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputConfig {
    /// JSON-lines event files; "-" reads stdin
    #[serde(default)]
    pub files: Vec<PathBuf>,
    /// Events handed to the monitor per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    1024
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    /// Record destination (default: stdout)
    pub path: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub include_summary: bool,
    /// Closing punctuation issued after the input is exhausted
    pub final_watermark: Option<i64>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            path: None,
            include_summary: true,
            final_watermark: None,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jsonl,
    Txt,
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config
        .monitor
        .validate()
        .with_context(|| format!("Invalid [monitor] section in {:?}", path))?;
    if config.input.batch_size == 0 {
        anyhow::bail!("batch_size must be at least 1 in {:?}", path);
    }

    Ok(config)
}
