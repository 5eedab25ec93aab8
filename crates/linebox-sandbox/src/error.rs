//! Sandbox error types.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during sandbox operations.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Module file could not be read.
    #[error("Failed to read module {path}: {source}")]
    ReadModule {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Engine could not be built from the configuration.
    #[error("Engine setup failed: {0}")]
    Engine(String),

    /// Module bytes failed to compile or link.
    #[error("Module compilation failed: {0}")]
    Compile(String),

    /// Instance could not be created from the compiled module.
    #[error("Instantiation failed: {0}")]
    Instantiation(String),

    /// Guest trapped.
    #[error("Module trapped: {0}")]
    Trap(String),

    /// Guest exited with a non-zero status.
    #[error("Module exited with status {0}")]
    Exit(i32),

    /// Guest ran past its deadline.
    #[error("Execution timed out after {0} ms")]
    Timeout(u64),

    /// Guest used up its fuel.
    #[error("Execution ran out of fuel")]
    FuelExhausted,

    /// Guest wrote more than the configured output limit.
    #[error("Output exceeded {0} bytes")]
    OutputLimit(u64),

    /// Host side failure unrelated to the guest.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SandboxError {
    /// Create a new compile error.
    pub fn compile(msg: impl Into<String>) -> Self {
        Self::Compile(msg.into())
    }

    /// Create a new instantiation error.
    pub fn instantiation(msg: impl Into<String>) -> Self {
        Self::Instantiation(msg.into())
    }

    /// Whether the failure is attributable to the guest module rather than the host.
    pub fn is_guest_fault(&self) -> bool {
        matches!(
            self,
            Self::Trap(_)
                | Self::Exit(_)
                | Self::Timeout(_)
                | Self::FuelExhausted
                | Self::OutputLimit(_)
        )
    }
}
