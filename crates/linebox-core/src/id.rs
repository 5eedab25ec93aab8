//! Session and instance naming.
//!
//! Session ids come from a counter owned by the acceptor. Instance names combine
//! the session id with a per-session sequence number, so names are unique for the
//! lifetime of the process without a shared random generator.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Wrap a raw id.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw id.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Lock-free source of session ids.
#[derive(Debug, Default)]
pub struct SessionIds {
    next: AtomicU64,
}

impl SessionIds {
    /// Create a new generator starting at 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next session id.
    pub fn next_id(&self) -> SessionId {
        SessionId(self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Name of one sandbox instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceName(String);

impl InstanceName {
    /// Build a name from its parts.
    pub fn new(session: SessionId, seq: u64) -> Self {
        Self(format!("{}-u{}", session, seq))
    }

    /// Borrow the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for InstanceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Per-session instance name generator.
///
/// Owned by a single session handler, so it needs no synchronization.
#[derive(Debug)]
pub struct InstanceNamer {
    session: SessionId,
    seq: u64,
}

impl InstanceNamer {
    /// Create a namer for the given session.
    pub fn new(session: SessionId) -> Self {
        Self { session, seq: 0 }
    }

    /// Produce the next instance name.
    pub fn next_name(&mut self) -> InstanceName {
        self.seq += 1;
        InstanceName::new(self.session, self.seq)
    }

    /// Number of names handed out so far.
    pub fn issued(&self) -> u64 {
        self.seq
    }
}
