//! Configuration loading and parsing

use anyhow::{bail, Context, Result};
use can_telemetry::DecoderConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InputConfig {
    #[serde(default)]
    pub dbc_files: Vec<PathBuf>,
    pub rules: Option<PathBuf>,
    pub log: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Evaluate the rule set after every N decoded frames
    #[serde(default = "default_evaluate_every")]
    pub evaluate_every: usize,
    /// Staleness period for rules without their own `period_ms`
    pub default_stale_ms: Option<u64>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            evaluate_every: default_evaluate_every(),
            default_stale_ms: None,
        }
    }
}

fn default_evaluate_every() -> usize {
    1
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl AppConfig {
    /// Check what a replay needs before any file is opened
    pub fn validate(&self) -> Result<()> {
        if self.input.dbc_files.is_empty() {
            bail!("no DBC files given (use --dbc or [input] dbc_files)");
        }
        if self.monitoring.evaluate_every == 0 {
            bail!("evaluate_every must be at least 1");
        }
        Ok(())
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}
