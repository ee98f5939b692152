//! Deployment configuration, deserialized from the JSON file named on
//! the command line (spec.md §6).
//!
//! Grounded on `service/main.rs`'s `Args` (clap-parsed CLI with
//! `env`-backed overrides) combined with the teacher's `serde`-derived
//! config structs; field names mirror spec.md §6's table verbatim so
//! existing deployments' config files need no translation.

use std::collections::HashMap;

use serde::Deserialize;

/// Top-level deployment config (spec.md §6).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub verification_timeout: u64,
    pub collector_stop_timeout: u64,
    #[serde(default = "default_verification_interval")]
    pub verification_interval: u64,
    pub base_api: String,
    #[serde(default = "default_output_folder")]
    pub output_folder: String,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_name")]
    pub log_name: String,
    pub sources: HashMap<String, SourceEntry>,
}

fn default_verification_interval() -> u64 {
    59
}
fn default_output_folder() -> String {
    "verified".to_string()
}
fn default_metrics_port() -> u16 {
    9345
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_name() -> String {
    "verifier".to_string()
}

/// One `sources.<name>` entry: an `enabled` flag plus whatever
/// source-specific fields that source's config needs, kept as a raw
/// JSON value and parsed per-source (spec.md §9's design note: "dynamic
/// `params` maps become a tagged variant keyed by source name").
#[derive(Debug, Clone, Deserialize)]
pub struct SourceEntry {
    #[serde(default)]
    pub enabled: bool,
    #[serde(flatten)]
    pub fields: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RadioFields {
    pub url: String,
    pub port: u16,
    pub prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MicroblogFields {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub tweet_interval: i64,
    pub second_start: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeismFields {
    pub source_url: String,
    pub fetch_interval: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EthereumFields {
    #[serde(default = "default_threshold")]
    pub threshold: usize,
    #[serde(default = "default_block_id_module")]
    pub block_id_module: u64,
    #[serde(default)]
    pub tokens: EthereumTokenFields,
}

fn default_threshold() -> usize {
    1
}
fn default_block_id_module() -> u64 {
    1
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EthereumTokenFields {
    pub infura: Option<String>,
    pub etherscan: Option<String>,
    pub rivet: Option<String>,
}

impl Config {
    /// Parses the config file at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or does not match
    /// the expected JSON schema.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read config file {}: {e}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("cannot parse config file {}: {e}", path.display()))?;
        Ok(config)
    }

    #[must_use]
    pub fn source(&self, name: &str) -> Option<&SourceEntry> {
        self.sources.get(name)
    }
}
