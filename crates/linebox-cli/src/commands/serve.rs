//! Serve command.

use super::load_config;
use anyhow::Context;
use clap::Args;
use linebox_core::config::SessionMode;
use linebox_core::Config;
use linebox_gateway::{Gateway, GatewayConfig};
use linebox_sandbox::ModuleHost;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Serve command arguments.
#[derive(Args)]
pub struct ServeArgs {
    /// Address to listen on (host:port)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// WebAssembly module to run for every line
    #[arg(short, long)]
    pub module: Option<PathBuf>,

    /// Maximum concurrently served connections
    #[arg(long)]
    pub max_sessions: Option<usize>,

    /// Lines answered per connection (one-shot, sequential)
    #[arg(long)]
    pub mode: Option<SessionMode>,

    /// Wall-clock limit for each instance, in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

impl ServeArgs {
    fn apply(self, config: &mut Config) {
        if let Some(bind) = self.bind {
            config.server.bind = bind;
        }
        if let Some(module) = self.module {
            config.sandbox.module = module;
        }
        if let Some(max) = self.max_sessions {
            config.server.max_sessions = max;
        }
        if let Some(mode) = self.mode {
            config.server.session_mode = mode;
        }
        if let Some(ms) = self.timeout_ms {
            config.sandbox.limits.timeout_ms = ms;
        }
    }
}

/// Run the serve command.
pub async fn run(args: ServeArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    // Without a compiled module there is nothing to serve.
    let host = ModuleHost::load(&config.sandbox.module, &config.sandbox)
        .with_context(|| format!("Failed to load module {}", config.sandbox.module.display()))?;

    let gateway = Gateway::new(GatewayConfig::from_config(&config)?, Arc::new(host));
    let listener = gateway.bind().await?;

    info!(
        mode = %config.server.session_mode,
        max_sessions = config.server.max_sessions,
        timeout_ms = config.sandbox.limits.timeout_ms,
        "Serving {}",
        config.sandbox.module.display()
    );

    gateway
        .serve_with_shutdown(listener, shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C"),
        Err(e) => {
            warn!(error = %e, "Failed to listen for Ctrl-C, serving until killed");
            std::future::pending::<()>().await;
        }
    }
}
