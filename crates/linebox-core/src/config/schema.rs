//! Configuration schema definitions.

use crate::types::ResourceLimits;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Main linebox configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Listener and session settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Module and sandbox settings.
    #[serde(default)]
    pub sandbox: SandboxConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind the listener on.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Maximum number of concurrently served connections.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// How many units of work a connection may submit.
    #[serde(default)]
    pub session_mode: SessionMode,

    /// Seconds to wait for the next line before closing an idle connection.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Longest accepted line, excluding the newline.
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,

    /// Seconds to wait for in-flight sessions on shutdown.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_sessions: default_max_sessions(),
            session_mode: SessionMode::default(),
            read_timeout_secs: default_read_timeout(),
            max_line_bytes: default_max_line_bytes(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:1997".to_string()
}

fn default_max_sessions() -> usize {
    256
}

fn default_read_timeout() -> u64 {
    30
}

fn default_max_line_bytes() -> usize {
    64 * 1024
}

fn default_shutdown_grace() -> u64 {
    10
}

/// Number of units of work served per connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionMode {
    /// Answer the first line, then close the connection.
    #[default]
    OneShot,

    /// Answer every line in order until the client closes its side.
    Sequential,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneShot => f.write_str("one-shot"),
            Self::Sequential => f.write_str("sequential"),
        }
    }
}

impl FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one-shot" | "oneshot" | "one_shot" => Ok(Self::OneShot),
            "sequential" => Ok(Self::Sequential),
            other => Err(format!(
                "invalid session mode '{}', expected 'one-shot' or 'sequential'",
                other
            )),
        }
    }
}

/// Sandbox configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Path to the WebAssembly module run for every unit of work.
    #[serde(default = "default_module")]
    pub module: PathBuf,

    /// Argument list handed to every instance; the first entry is argv[0].
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Per-instance resource limits.
    #[serde(default)]
    pub limits: ResourceLimits,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            module: default_module(),
            args: default_args(),
            limits: ResourceLimits::default(),
        }
    }
}

fn default_module() -> PathBuf {
    PathBuf::from("./bin.wasm")
}

fn default_args() -> Vec<String> {
    vec!["linebox".to_string()]
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Pretty,

    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("invalid log format '{}', expected 'pretty' or 'json'", other)),
        }
    }
}
