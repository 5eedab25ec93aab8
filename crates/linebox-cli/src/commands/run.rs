//! Run command: one local execution of the module.

use super::load_config;
use anyhow::Context;
use clap::Args;
use linebox_core::{InstanceName, SessionId};
use linebox_sandbox::ModuleHost;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

/// Run command arguments.
#[derive(Args)]
pub struct RunArgs {
    /// WebAssembly module to run
    #[arg(short, long)]
    pub module: Option<PathBuf>,

    /// Input handed to the module; all of stdin when omitted
    pub input: Option<String>,
}

/// Run the module once and copy its output to stdout.
pub async fn run(args: RunArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(module) = args.module {
        config.sandbox.module = module;
    }

    let host = ModuleHost::load(&config.sandbox.module, &config.sandbox)
        .with_context(|| format!("Failed to load module {}", config.sandbox.module.display()))?;

    let input = match args.input {
        Some(input) => input.into_bytes(),
        None => {
            let mut buf = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut buf)
                .await
                .context("Failed to read stdin")?;
            buf
        }
    };

    let name = InstanceName::new(SessionId::new(0), 1);
    let output = host.execute(name, input).await?;

    debug!(
        instance = %output.name,
        duration_ms = output.duration_ms,
        fuel_consumed = ?output.fuel_consumed,
        "Instance completed"
    );

    if !output.stderr.is_empty() {
        let mut stderr = tokio::io::stderr();
        stderr.write_all(&output.stderr).await?;
        stderr.flush().await?;
    }

    let mut stdout = tokio::io::stdout();
    stdout.write_all(&output.stdout).await?;
    stdout.flush().await?;
    Ok(())
}
