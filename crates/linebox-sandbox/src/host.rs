//! Module host: one engine, one compiled module, many instances.

use crate::error::SandboxError;
use crate::instance::{ExecutionOutput, GuestState, SandboxInstance};
use crate::limits::{EpochTicker, EPOCH_TICK};
use crate::Result;
use bytes::Bytes;
use linebox_core::config::SandboxConfig;
use linebox_core::{InstanceName, ResourceLimits};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use wasmtime::{Engine, ExternType, InstancePre, Linker, Module};
use wasmtime_wasi::preview1;

/// Name of the entry point every command module must export.
pub const ENTRY_POINT: &str = "_start";

/// Compiled module shared by every sandbox instance.
///
/// Built once at startup. After construction it is only read, so it can be shared
/// across sessions behind an `Arc` without locking.
pub struct ModuleHost {
    pre: InstancePre<GuestState>,
    args: Arc<[String]>,
    limits: ResourceLimits,
    source: Option<PathBuf>,
    _ticker: EpochTicker,
}

impl ModuleHost {
    /// Read and compile the module at `path`.
    pub fn load(path: &Path, config: &SandboxConfig) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|source| SandboxError::ReadModule {
            path: path.to_path_buf(),
            source,
        })?;

        info!(module = %path.display(), bytes = bytes.len(), "Loaded module");

        let mut host = Self::from_bytes(&bytes, config)?;
        host.source = Some(path.to_path_buf());
        Ok(host)
    }

    /// Compile a module from memory. The WebAssembly text format is accepted too.
    pub fn from_bytes(bytes: &[u8], config: &SandboxConfig) -> Result<Self> {
        let started = Instant::now();
        let limits = config.limits.clone();

        let mut engine_config = wasmtime::Config::new();
        engine_config.epoch_interruption(true);
        engine_config.consume_fuel(limits.fuel.is_some());
        let engine = Engine::new(&engine_config)
            .map_err(|e| SandboxError::Engine(format!("{:#}", e)))?;

        let module = Module::new(&engine, bytes)
            .map_err(|e| SandboxError::compile(format!("{:#}", e)))?;
        check_entry_point(&module)?;

        // WASI preview 1 shims only; no other host functions are linked.
        let mut linker: Linker<GuestState> = Linker::new(&engine);
        preview1::add_to_linker_sync(&mut linker, |state: &mut GuestState| &mut state.wasi)
            .map_err(|e| SandboxError::Engine(format!("{:#}", e)))?;

        let pre = linker
            .instantiate_pre(&module)
            .map_err(|e| SandboxError::compile(format!("{:#}", e)))?;

        let ticker = EpochTicker::start(&engine, EPOCH_TICK)?;

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            fuel = limits.fuel.is_some(),
            "Compiled module"
        );

        Ok(Self {
            pre,
            args: config.args.iter().cloned().collect(),
            limits,
            source: None,
            _ticker: ticker,
        })
    }

    /// Configure a fresh instance bound to `input`.
    pub fn instance(&self, name: InstanceName, input: impl Into<Bytes>) -> SandboxInstance {
        SandboxInstance::new(
            name,
            input.into(),
            self.args.clone(),
            self.pre.clone(),
            self.limits.clone(),
        )
    }

    /// Run one instance to completion on the blocking pool.
    pub async fn execute(
        &self,
        name: InstanceName,
        input: impl Into<Bytes>,
    ) -> Result<ExecutionOutput> {
        let instance = self.instance(name, input);
        tokio::task::spawn_blocking(move || instance.run())
            .await
            .map_err(|e| SandboxError::Internal(format!("Sandbox task failed: {}", e)))?
    }

    /// Argument list handed to every instance.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Limits applied to every instance.
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// File the module was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

impl std::fmt::Debug for ModuleHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHost")
            .field("source", &self.source)
            .field("args", &self.args)
            .field("limits", &self.limits)
            .finish()
    }
}

/// Require a `_start: [] -> []` export.
fn check_entry_point(module: &Module) -> Result<()> {
    match module.get_export(ENTRY_POINT) {
        Some(ExternType::Func(ty)) if ty.params().len() == 0 && ty.results().len() == 0 => Ok(()),
        Some(_) => Err(SandboxError::compile(format!(
            "export `{}` must be a function taking and returning nothing",
            ENTRY_POINT
        ))),
        None => Err(SandboxError::compile(format!(
            "module does not export `{}`",
            ENTRY_POINT
        ))),
    }
}
