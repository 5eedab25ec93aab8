//! Line-oriented TCP gateway for linebox.
//!
//! This crate provides:
//! - A connection acceptor with an admission gate and graceful drain
//! - Per-connection sessions that turn input lines into sandbox instances
//! - Newline framing with a maximum line length

pub mod error;
pub mod framing;
pub mod server;
pub mod session;

pub use error::GatewayError;
pub use framing::LineReader;
pub use server::{Gateway, GatewayConfig};
pub use session::{Session, SessionOptions, SessionSummary};

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
