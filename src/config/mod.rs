//! Configuration loading.
//!
//! Writes an embedded default on first run, then loads via the `config`
//! crate with an `Environment` override source, following the teacher's
//! `load_configuration` in `config/loader.rs`.

use std::path::Path;

use anyhow::{Context, Result};
use config::Environment;
use log::info;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct CoreConfig {
    /// This worker's shard index. Unset disables settlement entirely.
    pub shard_index: Option<u32>,
    #[serde(default = "default_shard_count")]
    pub shard_count: u32,

    #[serde(default = "default_min_username_length")]
    pub min_username_length: usize,
    #[serde(default = "default_max_username_length")]
    pub max_username_length: usize,
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
    #[serde(default = "default_max_password_length")]
    pub max_password_length: usize,
    #[serde(default = "default_salt_size")]
    pub salt_size: usize,
    #[serde(default = "default_max_wallet_create_attempts")]
    pub max_wallet_create_attempts: u32,

    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_settlement_interval_secs")]
    pub settlement_interval_secs: u64,
}

fn default_shard_count() -> u32 {
    1
}
fn default_min_username_length() -> usize {
    3
}
fn default_max_username_length() -> usize {
    30
}
fn default_min_password_length() -> usize {
    7
}
fn default_max_password_length() -> usize {
    50
}
fn default_salt_size() -> usize {
    32
}
fn default_max_wallet_create_attempts() -> u32 {
    10
}
fn default_database_path() -> String {
    "data/ledger.db".to_string()
}
fn default_settlement_interval_secs() -> u64 {
    30
}

pub fn get_default_config() -> &'static str {
    include_str!("../../resources/default_config.toml")
}

/// Loads configuration from `path`, creating it from the embedded default
/// if it doesn't exist, and applying `LEDGER_*` environment overrides.
pub fn load_configuration(path: &Path) -> Result<CoreConfig> {
    if !path.exists() {
        write_config_to(path, get_default_config()).context("could not create default config")?;
        info!(path:% = path.display(); "created new configuration file");
    }

    let filename = path.to_str().context("invalid config file path")?;

    let cfg = config::Config::builder()
        .add_source(config::File::with_name(filename))
        .add_source(Environment::with_prefix("LEDGER").prefix_separator("_").separator("__"))
        .build()
        .context("could not build configuration")?;

    cfg.try_deserialize().context("could not deserialize configuration")
}

fn write_config_to(path: &Path, source: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("failed to create parent directories")?;
    }
    std::fs::write(path, format!("{source}\n")).context("failed to write config file")
}
