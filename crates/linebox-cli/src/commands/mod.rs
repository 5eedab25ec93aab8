//! CLI command implementations.

pub mod check;
pub mod config;
pub mod run;
pub mod serve;

use anyhow::Context;
use linebox_core::Config;
use std::path::Path;

/// Load the configuration and apply `LINEBOX_*` overrides.
pub(crate) fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let mut config = Config::load_from(path).context("Failed to load configuration")?;
    config
        .apply_env_overrides()
        .context("Invalid environment override")?;
    Ok(config)
}
