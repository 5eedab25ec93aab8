//! Check command: configuration and module diagnostics.

use super::load_config;
use clap::Args;
use console::{style, Emoji};
use linebox_sandbox::ModuleHost;
use std::path::{Path, PathBuf};
use std::time::Instant;

static CHECK: Emoji = Emoji("✓", "+");
static CROSS: Emoji = Emoji("✗", "x");
static WARN: Emoji = Emoji("⚠", "!");

/// Check command arguments.
#[derive(Args)]
pub struct CheckArgs {
    /// WebAssembly module to compile
    #[arg(short, long)]
    pub module: Option<PathBuf>,
}

/// Run the check command.
pub async fn run(args: CheckArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    println!("linebox check\n");

    let mut errors = 0;

    println!("Checking configuration...");

    let mut config = match load_config(config_path) {
        Ok(config) => {
            match config_path {
                Some(path) => println!("  {} Loaded {}", style(CHECK).green(), path.display()),
                None => println!("  {} Loaded configuration", style(CHECK).green()),
            }
            config
        }
        Err(e) => {
            println!("  {} {:#}", style(CROSS).red(), e);
            println!("  {} Continuing with defaults", style(WARN).yellow());
            errors += 1;
            Default::default()
        }
    };

    if let Some(module) = args.module {
        config.sandbox.module = module;
    }

    match config.validate() {
        Ok(()) => println!("  {} Configuration valid", style(CHECK).green()),
        Err(e) => {
            println!("  {} {}", style(CROSS).red(), e);
            errors += 1;
        }
    }

    println!("\nChecking module...");

    let started = Instant::now();
    match ModuleHost::load(&config.sandbox.module, &config.sandbox) {
        Ok(host) => {
            println!(
                "  {} Compiled {} in {} ms",
                style(CHECK).green(),
                config.sandbox.module.display(),
                started.elapsed().as_millis()
            );
            let limits = host.limits();
            println!(
                "  {} Limits: {} ms, {} bytes memory, {} bytes output, fuel {}",
                style(CHECK).green(),
                limits.timeout_ms,
                limits.memory_bytes,
                limits.output_bytes,
                limits
                    .fuel
                    .map_or_else(|| "unmetered".to_string(), |fuel| fuel.to_string())
            );
        }
        Err(e) => {
            println!("  {} {}", style(CROSS).red(), e);
            errors += 1;
        }
    }

    println!();
    if errors > 0 {
        anyhow::bail!("{} check(s) failed", errors);
    }

    println!("{} Ready to serve", style(CHECK).green());
    Ok(())
}
