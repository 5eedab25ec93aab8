//! Resource limits for sandbox instances.

use serde::{Deserialize, Serialize};

/// Resource limits applied to every sandbox instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Wall clock deadline for one execution, in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// Maximum linear memory in bytes.
    #[serde(default = "default_memory")]
    pub memory_bytes: u64,

    /// Maximum stdout in bytes. Writing more fails the instance.
    #[serde(default = "default_output_size")]
    pub output_bytes: u64,

    /// Maximum captured stderr in bytes. Anything past it is dropped.
    #[serde(default = "default_stderr_size")]
    pub stderr_bytes: u64,

    /// Instruction fuel per execution. Metering is disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuel: Option<u64>,
}

fn default_timeout() -> u64 {
    10_000 // 10 seconds
}

fn default_memory() -> u64 {
    64 * 1024 * 1024 // 64 MB
}

fn default_output_size() -> u64 {
    1024 * 1024 // 1 MB
}

fn default_stderr_size() -> u64 {
    64 * 1024 // 64 KB
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout(),
            memory_bytes: default_memory(),
            output_bytes: default_output_size(),
            stderr_bytes: default_stderr_size(),
            fuel: None,
        }
    }
}

impl ResourceLimits {
    /// Create new resource limits with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style method to set the execution deadline.
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    /// Builder-style method to set memory limit.
    pub fn with_memory(mut self, bytes: u64) -> Self {
        self.memory_bytes = bytes;
        self
    }

    /// Builder-style method to set the output limit.
    pub fn with_output(mut self, bytes: u64) -> Self {
        self.output_bytes = bytes;
        self
    }

    /// Builder-style method to enable fuel metering.
    pub fn with_fuel(mut self, fuel: u64) -> Self {
        self.fuel = Some(fuel);
        self
    }
}
