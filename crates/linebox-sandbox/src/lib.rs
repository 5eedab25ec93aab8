//! WebAssembly sandbox execution for linebox.
//!
//! A [`ModuleHost`] compiles one module at startup. Every unit of work then gets
//! its own [`SandboxInstance`]: a fresh wasmtime store with a WASI preview 1
//! context whose stdin is the unit, whose stdout is captured, and which has no
//! filesystem, environment, or network capabilities.

pub mod error;
pub mod host;
pub mod instance;
pub mod limits;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use error::SandboxError;
pub use host::ModuleHost;
pub use instance::{ExecutionOutput, InstanceState, SandboxInstance};
pub use limits::EpochTicker;

/// Result type for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;
