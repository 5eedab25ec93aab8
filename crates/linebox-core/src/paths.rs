//! Path resolution utilities.

use crate::error::ConfigError;
use std::path::PathBuf;

/// Get the linebox configuration directory (`<config dir>/linebox`).
pub fn base_dir() -> Result<PathBuf, ConfigError> {
    let dir = dirs::config_dir().ok_or_else(|| {
        ConfigError::Validation("Could not determine configuration directory".to_string())
    })?;
    Ok(dir.join("linebox"))
}

/// Get the main config file path (`<config dir>/linebox/linebox.json5`).
pub fn config_file() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("linebox.json5"))
}
