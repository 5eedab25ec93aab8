//! Mapping resource limits onto wasmtime stores.

use crate::error::SandboxError;
use linebox_core::ResourceLimits;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;
use wasmtime::{Engine, StoreLimits, StoreLimitsBuilder};

/// Interval between epoch increments.
pub const EPOCH_TICK: Duration = Duration::from_millis(10);

/// Number of epoch ticks a store may run before it is interrupted.
///
/// One extra tick is added because the first increment can land right after the
/// deadline is armed.
pub fn deadline_ticks(timeout_ms: u64) -> u64 {
    let tick_ms = EPOCH_TICK.as_millis() as u64;
    timeout_ms.div_ceil(tick_ms).max(1) + 1
}

/// Store limiter enforcing the memory cap.
pub fn store_limits(limits: &ResourceLimits) -> StoreLimits {
    let memory = usize::try_from(limits.memory_bytes).unwrap_or(usize::MAX);
    StoreLimitsBuilder::new().memory_size(memory).build()
}

/// Clamp a byte limit to the platform's `usize`.
pub fn capacity(bytes: u64) -> usize {
    usize::try_from(bytes).unwrap_or(usize::MAX)
}

/// Background thread advancing the engine epoch.
///
/// Stores armed with an epoch deadline trap once the epoch passes it. The thread
/// stops when the ticker is dropped.
pub struct EpochTicker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EpochTicker {
    /// Start ticking the given engine.
    pub fn start(engine: &Engine, interval: Duration) -> Result<Self, SandboxError> {
        let engine = engine.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();

        let handle = thread::Builder::new()
            .name("linebox-epoch".to_string())
            .spawn(move || {
                while !flag.load(Ordering::Relaxed) {
                    thread::sleep(interval);
                    engine.increment_epoch();
                }
            })
            .map_err(|e| SandboxError::Engine(format!("Failed to spawn epoch ticker: {}", e)))?;

        debug!("Epoch ticker started ({:?} interval)", interval);

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }
}

impl Drop for EpochTicker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for EpochTicker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpochTicker")
            .field("running", &self.handle.is_some())
            .finish()
    }
}
