//! Environment variable handling.

use crate::error::ConfigError;
use std::env;

/// Environment variable names.
pub mod vars {
    pub const CONFIG: &str = "LINEBOX_CONFIG";
    pub const BIND: &str = "LINEBOX_BIND";
    pub const MODULE: &str = "LINEBOX_MODULE";
    pub const MAX_SESSIONS: &str = "LINEBOX_MAX_SESSIONS";
}

/// Get an environment variable, returning None if not set or empty.
pub fn get_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable as a usize. A set but unparsable value is an
/// error rather than being ignored.
pub fn get_usize(name: &str) -> Result<Option<usize>, ConfigError> {
    get_var(name)
        .map(|raw| raw.parse().map_err(|_| ConfigError::invalid_value(name, raw)))
        .transpose()
}
