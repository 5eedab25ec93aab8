//! # linebox-core
//!
//! Core types, configuration, and utilities for linebox.
//!
//! This crate provides shared functionality used across all linebox crates:
//!
//! - **Configuration**: Loading, validation, and management of config files
//! - **Types**: Resource limits applied to every sandbox instance
//! - **Utilities**: Path resolution, session and instance naming, environment handling

pub mod config;
pub mod env;
pub mod error;
pub mod id;
pub mod paths;
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use error::{ConfigError, Error, Result};
pub use id::{InstanceName, InstanceNamer, SessionId, SessionIds};
pub use types::ResourceLimits;
