//! TOML configuration for the completion endpoint and the spreadsheet
//! extractor. Every field has a default, so an empty file (or no file at all)
//! yields a working configuration.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub spreadsheet: SpreadsheetConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Corpus characters sent with each query; the rest is cut off.
    #[serde(default = "default_max_document_chars")]
    pub max_document_chars: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Name of the environment variable holding the bearer token.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            temperature: default_temperature(),
            max_document_chars: default_max_document_chars(),
            timeout_secs: default_timeout_secs(),
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_endpoint() -> String {
    "https://api.mistral.ai/v1/chat/completions".to_string()
}
fn default_model() -> String {
    "mistral-medium".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_document_chars() -> usize {
    8000
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_api_key_env() -> String {
    "MISTRAL_API_KEY".to_string()
}

impl GatewayConfig {
    /// Reads the API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String> {
        let key = std::env::var(&self.api_key_env)
            .with_context(|| format!("{} environment variable not set", self.api_key_env))?;
        if key.trim().is_empty() {
            anyhow::bail!("{} environment variable is empty", self.api_key_env);
        }
        Ok(key)
    }
}

/// Bounds for the spreadsheet extractor.
#[derive(Debug, Deserialize, Clone)]
pub struct SpreadsheetConfig {
    #[serde(default = "default_max_sheets")]
    pub max_sheets: usize,
    /// Rows rendered per sheet before a truncation note is added.
    #[serde(default = "default_max_rows")]
    pub max_rows: u32,
    #[serde(default = "default_max_cols")]
    pub max_cols: u32,
    /// Window scanned for content when a sheet declares no usable dimension.
    #[serde(default = "default_probe_rows")]
    pub probe_rows: u32,
    #[serde(default = "default_probe_cols")]
    pub probe_cols: u32,
}

impl Default for SpreadsheetConfig {
    fn default() -> Self {
        Self {
            max_sheets: default_max_sheets(),
            max_rows: default_max_rows(),
            max_cols: default_max_cols(),
            probe_rows: default_probe_rows(),
            probe_cols: default_probe_cols(),
        }
    }
}

fn default_max_sheets() -> usize {
    100
}
fn default_max_rows() -> u32 {
    200
}
fn default_max_cols() -> u32 {
    30
}
fn default_probe_rows() -> u32 {
    100
}
fn default_probe_cols() -> u32 {
    50
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)?;
    Ok(config)
}

/// Loads `path` when it exists, otherwise falls back to defaults.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        Ok(Config::default())
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let gateway = &config.gateway;
    if gateway.endpoint.trim().is_empty() {
        anyhow::bail!("gateway.endpoint must not be empty");
    }
    if gateway.model.trim().is_empty() {
        anyhow::bail!("gateway.model must not be empty");
    }
    if gateway.max_document_chars == 0 {
        anyhow::bail!("gateway.max_document_chars must be > 0");
    }
    if gateway.timeout_secs == 0 {
        anyhow::bail!("gateway.timeout_secs must be > 0");
    }
    if !(0.0..=2.0).contains(&gateway.temperature) {
        anyhow::bail!("gateway.temperature must be in [0.0, 2.0]");
    }

    let sheet = &config.spreadsheet;
    if sheet.max_sheets == 0 {
        anyhow::bail!("spreadsheet.max_sheets must be > 0");
    }
    if sheet.max_rows == 0 || sheet.max_cols == 0 {
        anyhow::bail!("spreadsheet.max_rows and spreadsheet.max_cols must be > 0");
    }
    if sheet.probe_rows == 0 || sheet.probe_cols == 0 {
        anyhow::bail!("spreadsheet.probe_rows and spreadsheet.probe_cols must be > 0");
    }

    Ok(())
}
