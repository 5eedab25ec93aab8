//! Gateway error types.

use linebox_core::InstanceName;
use linebox_sandbox::SandboxError;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur in the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// I/O error on a session's connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Listener could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Listening socket failed; the acceptor cannot continue.
    #[error("Listener failed: {0}")]
    Listener(#[source] std::io::Error),

    /// Sandbox instance failed.
    #[error("Instance {instance} failed: {source}")]
    Sandbox {
        instance: InstanceName,
        #[source]
        source: SandboxError,
    },

    /// Client sent nothing within the read timeout.
    #[error("No input received within {0:?}")]
    ReadTimeout(Duration),

    /// Client sent a line longer than allowed.
    #[error("Line exceeds {0} bytes")]
    LineTooLong(usize),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Whether the error was caused by the client rather than the module or the host.
    pub fn is_client_fault(&self) -> bool {
        matches!(self, Self::ReadTimeout(_) | Self::LineTooLong(_) | Self::Io(_))
    }

    /// Whether the module misbehaved on its input. The host itself is healthy.
    pub fn is_guest_fault(&self) -> bool {
        matches!(self, Self::Sandbox { source, .. } if source.is_guest_fault())
    }
}
