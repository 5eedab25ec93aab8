//! Configuration loading and persistence.

use super::{Config, SessionMode};
use crate::env;
use crate::error::ConfigError;
use crate::paths;
use crate::types::ResourceLimits;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::debug;

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = paths::config_file()?;
        Self::load(&path)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Json5(e.to_string()))
    }

    /// Load configuration from an explicit path, or the default path when none
    /// is given. A missing default file yields the defaults; a missing explicit
    /// file is an error.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::load_default() {
                Ok(config) => Ok(config),
                Err(ConfigError::NotFound(path)) => {
                    debug!("No config file at {}, using defaults", path.display());
                    Ok(Self::default())
                }
                Err(e) => Err(e),
            },
        }
    }

    /// Save configuration to a file path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_json5()?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Serialize to JSON5 string.
    pub fn to_json5(&self) -> Result<String, ConfigError> {
        // json5 doesn't have a serializer, so we use serde_json with pretty print
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply `LINEBOX_*` environment overrides.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(bind) = env::get_var(env::vars::BIND) {
            debug!("Overriding bind address from {}", env::vars::BIND);
            self.server.bind = bind;
        }

        if let Some(module) = env::get_var(env::vars::MODULE) {
            debug!("Overriding module path from {}", env::vars::MODULE);
            self.sandbox.module = PathBuf::from(module);
        }

        if let Some(max) = env::get_usize(env::vars::MAX_SESSIONS)? {
            debug!("Overriding max_sessions from {}", env::vars::MAX_SESSIONS);
            self.server.max_sessions = max;
        }

        Ok(())
    }

    /// Parse the configured bind address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|_| ConfigError::invalid_value("server.bind", self.server.bind.clone()))
    }

    /// Validate the configuration, collecting all errors before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        // 1. Bind address must parse
        if self.server.bind.parse::<SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid bind address '{}', expected host:port",
                self.server.bind
            ));
        }

        // 2. Admission gate must admit something
        if self.server.max_sessions == 0 {
            errors.push("max_sessions must be greater than 0".to_string());
        }
        if self.server.max_sessions > u32::MAX as usize {
            errors.push(format!(
                "max_sessions {} exceeds maximum of {}",
                self.server.max_sessions,
                u32::MAX
            ));
        }

        // 3. Session timing and framing
        if self.server.read_timeout_secs == 0 {
            errors.push("read_timeout_secs must be greater than 0".to_string());
        }
        if self.server.max_line_bytes == 0 {
            errors.push("max_line_bytes must be greater than 0".to_string());
        }

        // 4. Module path and argv
        if self.sandbox.module.as_os_str().is_empty() {
            errors.push("Sandbox module path must not be empty".to_string());
        }
        if self.sandbox.args.is_empty() {
            errors.push("Sandbox args must contain at least argv[0]".to_string());
        }

        // 5. Resource limits
        let limits = &self.sandbox.limits;
        if limits.timeout_ms == 0 {
            errors.push("Sandbox timeout_ms must be greater than 0".to_string());
        }
        if limits.memory_bytes < 64 * 1024 {
            errors.push(format!(
                "Sandbox memory_bytes {} is below one WebAssembly page (65536)",
                limits.memory_bytes
            ));
        }
        if limits.output_bytes == 0 {
            errors.push("Sandbox output_bytes must be greater than 0".to_string());
        }
        if limits.fuel == Some(0) {
            errors.push("Sandbox fuel must be greater than 0 when set".to_string());
        }

        // Return collected errors
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }
}

/// Configuration builder for creating configs programmatically.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new config builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bind address.
    pub fn bind(mut self, bind: impl Into<String>) -> Self {
        self.config.server.bind = bind.into();
        self
    }

    /// Set the admission gate size.
    pub fn max_sessions(mut self, max: usize) -> Self {
        self.config.server.max_sessions = max;
        self
    }

    /// Set the session mode.
    pub fn session_mode(mut self, mode: SessionMode) -> Self {
        self.config.server.session_mode = mode;
        self
    }

    /// Set the idle read timeout.
    pub fn read_timeout_secs(mut self, secs: u64) -> Self {
        self.config.server.read_timeout_secs = secs;
        self
    }

    /// Set the per-instance resource limits.
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.config.sandbox.limits = limits;
        self
    }

    /// Build the config.
    pub fn build(self) -> Config {
        self.config
    }
}
