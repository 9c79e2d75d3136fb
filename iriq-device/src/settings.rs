//! Configuration file and environment overrides

use std::env;
use std::fs;
use std::path::Path;

use anyhow::Context;
use iriq_core::DeviceConfig;

/// Config file used when `IRIQ_CONFIG` is unset
pub const DEFAULT_CONFIG_PATH: &str = "/etc/iriq/device.json";

/// Location of the config file
pub fn config_path() -> String {
    env::var("IRIQ_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into())
}

/// Read JSON from `path`, apply overrides from `api_key_override`, validate
pub fn load(
    path: impl AsRef<Path>,
    api_key_override: Option<String>,
) -> anyhow::Result<DeviceConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let mut config = DeviceConfig::parse(&raw)
        .with_context(|| format!("parsing config {}", path.display()))?;

    // the environment wins over the file
    if let Some(key) = api_key_override.filter(|k| !k.is_empty()) {
        config.backend.api_key = key;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// [`load`] with `IRIQ_API_KEY` from the environment
pub fn load_from_env(path: impl AsRef<Path>) -> anyhow::Result<DeviceConfig> {
    load(path, env::var("IRIQ_API_KEY").ok())
}
