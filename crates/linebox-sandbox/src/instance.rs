//! Sandbox instance lifecycle.

use crate::error::SandboxError;
use crate::host::ENTRY_POINT;
use crate::limits::{capacity, deadline_ticks, store_limits};
use crate::Result;
use bytes::Bytes;
use linebox_core::{InstanceName, ResourceLimits};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, debug_span, trace};
use wasmtime::{InstancePre, Store, StoreLimits, Trap};
use wasmtime_wasi::pipe::{MemoryInputPipe, MemoryOutputPipe};
use wasmtime_wasi::preview1::WasiP1Ctx;
use wasmtime_wasi::{I32Exit, WasiCtxBuilder};

/// Per-store data: the WASI context and the memory limiter.
pub struct GuestState {
    pub(crate) wasi: WasiP1Ctx,
    limits: StoreLimits,
}

/// Lifecycle state of a sandbox instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// Buffers and name bound, not yet running.
    Configured,
    /// Executing against the compiled module.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Configured => "configured",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Output captured from one execution.
#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    /// Instance that produced the output.
    pub name: InstanceName,

    /// Bytes written to stdout.
    pub stdout: Bytes,

    /// Bytes written to stderr.
    pub stderr: Bytes,

    /// Execution duration in milliseconds.
    pub duration_ms: u64,

    /// Fuel used, when metering is enabled.
    pub fuel_consumed: Option<u64>,
}

impl ExecutionOutput {
    /// Stdout decoded as UTF-8, replacing invalid sequences.
    pub fn stdout_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }
}

/// One isolated execution of the compiled module.
///
/// Created in the `Configured` state by [`ModuleHost::instance`]. [`run`] consumes
/// the instance, so it can never be reused; the store and all WASI handles are
/// dropped before `run` returns, whatever the outcome.
///
/// [`ModuleHost::instance`]: crate::ModuleHost::instance
/// [`run`]: SandboxInstance::run
pub struct SandboxInstance {
    name: InstanceName,
    input: Bytes,
    args: Arc<[String]>,
    pre: InstancePre<GuestState>,
    limits: ResourceLimits,
    state: InstanceState,
}

impl SandboxInstance {
    pub(crate) fn new(
        name: InstanceName,
        input: Bytes,
        args: Arc<[String]>,
        pre: InstancePre<GuestState>,
        limits: ResourceLimits,
    ) -> Self {
        Self {
            name,
            input,
            args,
            pre,
            limits,
            state: InstanceState::Configured,
        }
    }

    /// Instance name.
    pub fn name(&self) -> &InstanceName {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> InstanceState {
        self.state
    }

    /// Input bound to this instance.
    pub fn input(&self) -> &Bytes {
        &self.input
    }

    /// Execute synchronously. Blocks the calling thread until the guest returns,
    /// traps, exits, or hits its deadline.
    pub fn run(mut self) -> Result<ExecutionOutput> {
        let span = debug_span!("instance", instance = %self.name);
        let _enter = span.enter();

        let started = Instant::now();
        // One spare byte so a write past the limit is visible afterwards.
        let output_limit = self.limits.output_bytes;
        let stdout = MemoryOutputPipe::new(capacity(output_limit).saturating_add(1));
        let stderr = MemoryOutputPipe::new(capacity(self.limits.stderr_bytes));

        let result = match self.execute(stdout.clone(), stderr.clone()) {
            _ if stdout.contents().len() as u64 > output_limit => {
                Err(SandboxError::OutputLimit(output_limit))
            }
            result => result,
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(fuel_consumed) => {
                self.transition(InstanceState::Completed);
                Ok(ExecutionOutput {
                    name: self.name,
                    stdout: stdout.contents(),
                    stderr: stderr.contents(),
                    duration_ms,
                    fuel_consumed,
                })
            }
            Err(e) => {
                self.transition(InstanceState::Failed);
                let stderr = stderr.contents();
                if !stderr.is_empty() {
                    debug!(stderr = %String::from_utf8_lossy(&stderr), "Guest stderr");
                }
                debug!(duration_ms, error = %e, "Instance failed");
                Err(e)
            }
        }
    }

    /// Build the store, instantiate, and call the entry point. The store is
    /// dropped when this returns.
    fn execute(
        &mut self,
        stdout: MemoryOutputPipe,
        stderr: MemoryOutputPipe,
    ) -> Result<Option<u64>> {
        let wasi = WasiCtxBuilder::new()
            .stdin(MemoryInputPipe::new(self.input.clone()))
            .stdout(stdout)
            .stderr(stderr)
            .args(&self.args[..])
            .build_p1();

        let mut store = Store::new(
            self.pre.module().engine(),
            GuestState {
                wasi,
                limits: store_limits(&self.limits),
            },
        );
        store.limiter(|state| &mut state.limits);
        store.set_epoch_deadline(deadline_ticks(self.limits.timeout_ms));
        if let Some(fuel) = self.limits.fuel {
            store
                .set_fuel(fuel)
                .map_err(|e| SandboxError::Internal(format!("{:#}", e)))?;
        }

        self.transition(InstanceState::Running);

        let instance = self
            .pre
            .instantiate(&mut store)
            .map_err(|e| self.classify(e, SandboxError::Instantiation))?;

        let start = instance
            .get_typed_func::<(), ()>(&mut store, ENTRY_POINT)
            .map_err(|e| SandboxError::instantiation(format!("{:#}", e)))?;

        match start.call(&mut store, ()) {
            Ok(()) => {}
            Err(e) => match e.downcast_ref::<I32Exit>() {
                Some(I32Exit(0)) => trace!("Guest exited with status 0"),
                _ => return Err(self.classify(e, SandboxError::Trap)),
            },
        }

        let fuel_consumed = match self.limits.fuel {
            Some(fuel) => store.get_fuel().ok().map(|left| fuel.saturating_sub(left)),
            None => None,
        };

        Ok(fuel_consumed)
    }

    /// Map a wasmtime error onto the sandbox taxonomy.
    fn classify(&self, err: wasmtime::Error, fallback: fn(String) -> SandboxError) -> SandboxError {
        if let Some(exit) = err.downcast_ref::<I32Exit>() {
            return SandboxError::Exit(exit.0);
        }

        match err.downcast_ref::<Trap>() {
            Some(Trap::Interrupt) => SandboxError::Timeout(self.limits.timeout_ms),
            Some(Trap::OutOfFuel) => SandboxError::FuelExhausted,
            Some(_) => SandboxError::Trap(format!("{:#}", err)),
            None => fallback(format!("{:#}", err)),
        }
    }

    fn transition(&mut self, next: InstanceState) {
        trace!(from = %self.state, to = %next, "Instance state");
        self.state = next;
    }
}

impl fmt::Debug for SandboxInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxInstance")
            .field("name", &self.name)
            .field("input_len", &self.input.len())
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use linebox_core::SessionId;

    fn name(seq: u64) -> InstanceName {
        InstanceName::new(SessionId::new(9), seq)
    }

    #[test]
    fn test_new_instance_is_configured() {
        let host = fixtures::host(fixtures::ECHO);
        let instance = host.instance(name(1), "hi");
        assert_eq!(instance.state(), InstanceState::Configured);
        assert_eq!(instance.name().as_str(), "s9-u1");
        assert_eq!(&instance.input()[..], b"hi");
    }

    #[test]
    fn test_echo_completes() {
        let host = fixtures::host(fixtures::ECHO);
        let output = host.instance(name(1), "hello").run().unwrap();
        assert_eq!(output.stdout_lossy(), "hello");
        assert_eq!(output.name, name(1));
        assert!(output.stderr.is_empty());
        assert!(output.fuel_consumed.is_none());
    }

    #[test]
    fn test_empty_input_echoes_nothing() {
        let host = fixtures::host(fixtures::ECHO);
        let output = host.instance(name(1), Bytes::new()).run().unwrap();
        assert!(output.stdout.is_empty());
    }

    #[test]
    fn test_binary_input_passes_through() {
        let host = fixtures::host(fixtures::REVERSE);
        let output = host.instance(name(1), vec![0u8, 1, 0xff]).run().unwrap();
        assert_eq!(&output.stdout[..], &[0xff, 1, 0]);
    }

    #[test]
    fn test_same_input_same_output() {
        let host = fixtures::host(fixtures::REVERSE);
        let first = host.instance(name(1), "determinism").run().unwrap();
        let second = host.instance(name(2), "determinism").run().unwrap();
        assert_eq!(first.stdout, second.stdout);
    }

    #[test]
    fn test_instance_name_not_visible_to_guest() {
        let host = fixtures::host(fixtures::ARGV);
        let output = host.instance(name(77), "").run().unwrap();
        assert_eq!(&output.stdout[..], b"linebox\0");
        assert!(!output.stdout_lossy().contains("s9-u77"));
    }

    #[test]
    fn test_trap_fails() {
        let host = fixtures::host(fixtures::TRAP);
        let err = host.instance(name(1), "x").run().unwrap_err();
        assert!(matches!(err, SandboxError::Trap(_)));
        assert!(err.is_guest_fault());
    }

    #[test]
    fn test_stderr_is_not_output() {
        let host = fixtures::host(fixtures::STDERR_THEN_TRAP);
        let err = host.instance(name(1), "").run().unwrap_err();
        assert!(matches!(err, SandboxError::Trap(_)));
    }

    #[test]
    fn test_output_over_limit_fails() {
        let host = fixtures::host_with(fixtures::ECHO, ResourceLimits::new().with_output(4));
        let err = host.instance(name(1), "hello world").run().unwrap_err();
        assert!(matches!(err, SandboxError::OutputLimit(4)));
        assert!(err.is_guest_fault());
    }

    #[test]
    fn test_output_at_limit_succeeds() {
        let host = fixtures::host_with(fixtures::ECHO, ResourceLimits::new().with_output(5));
        let output = host.instance(name(1), "hello").run().unwrap();
        assert_eq!(output.stdout_lossy(), "hello");
    }

    #[test]
    fn test_stderr_is_capped_without_failing() {
        let limits = ResourceLimits {
            stderr_bytes: 4,
            ..ResourceLimits::default()
        };
        let host = fixtures::host_with(fixtures::TEE_STDERR, limits);
        let output = host.instance(name(1), "hello world").run().unwrap();
        assert_eq!(output.stdout_lossy(), "hello world");
        assert_eq!(&output.stderr[..], b"hell");
    }

    #[test]
    fn test_exit_zero_is_success() {
        let host = fixtures::host(fixtures::EXIT_ZERO);
        let output = host.instance(name(1), "").run().unwrap();
        assert_eq!(&output.stdout[..], b"ok");
    }

    #[test]
    fn test_nonzero_exit_fails() {
        let host = fixtures::host(fixtures::EXIT_THREE);
        let err = host.instance(name(1), "").run().unwrap_err();
        assert!(matches!(err, SandboxError::Exit(3)));
    }

    #[test]
    fn test_deadline_interrupts_infinite_loop() {
        let host = fixtures::host_with(
            fixtures::LOOP_FOREVER,
            ResourceLimits::new().with_timeout_ms(50),
        );
        let started = Instant::now();
        let err = host.instance(name(1), "").run().unwrap_err();
        assert!(matches!(err, SandboxError::Timeout(50)));
        assert!(started.elapsed().as_secs() < 5);
    }

    #[test]
    fn test_fuel_exhaustion() {
        let host = fixtures::host_with(
            fixtures::LOOP_FOREVER,
            ResourceLimits::new().with_timeout_ms(60_000).with_fuel(10_000),
        );
        let err = host.instance(name(1), "").run().unwrap_err();
        assert!(matches!(err, SandboxError::FuelExhausted));
    }

    #[test]
    fn test_fuel_reported_on_success() {
        let host = fixtures::host_with(fixtures::ECHO, ResourceLimits::new().with_fuel(1_000_000));
        let output = host.instance(name(1), "abc").run().unwrap();
        assert_eq!(output.stdout_lossy(), "abc");
        assert!(output.fuel_consumed.unwrap() > 0);
    }

    #[test]
    fn test_memory_cap_blocks_instantiation() {
        let host = fixtures::host_with(
            fixtures::TWO_PAGES,
            ResourceLimits::new().with_memory(64 * 1024),
        );
        let err = host.instance(name(1), "").run().unwrap_err();
        assert!(matches!(err, SandboxError::Instantiation(_)));
    }

    #[test]
    fn test_host_reusable_after_failure() {
        let host = fixtures::host_with(fixtures::EXIT_THREE, ResourceLimits::default());
        assert!(host.instance(name(1), "").run().is_err());
        assert!(host.instance(name(2), "").run().is_err());

        let echo = fixtures::host(fixtures::ECHO);
        assert!(echo.instance(name(3), "still fine").run().is_ok());
    }
}
