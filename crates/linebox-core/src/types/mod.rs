//! Common type definitions.

mod limits;

pub use limits::ResourceLimits;
