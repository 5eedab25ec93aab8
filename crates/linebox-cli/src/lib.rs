//! linebox command-line interface.

pub mod commands;

use clap::{Parser, Subcommand};
use linebox_core::config::{Config, LogFormat, LogLevel};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Crates whose events are shown at the configured level.
const LOG_TARGETS: &[&str] = &["linebox_core", "linebox_sandbox", "linebox_gateway", "linebox_cli"];

/// linebox - run a WebAssembly command for every line received over TCP
#[derive(Parser)]
#[command(name = "linebox")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file
    #[arg(short, long, env = "LINEBOX_CONFIG", global = true)]
    pub config: Option<std::path::PathBuf>,

    /// Log output format (pretty, json)
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Serve the module over TCP
    Serve(commands::serve::ServeArgs),

    /// Run the module once against a single input
    Run(commands::run::RunArgs),

    /// Validate the configuration and compile the module
    Check(commands::check::CheckArgs),

    /// Configuration management
    Config(commands::config::ConfigArgs),

    /// Show version information
    Version,
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set. Otherwise the configured level applies, raised by
/// each `-v`. Events go to stderr so `run` output stays clean.
pub fn init_logging(cli: &Cli) {
    let logging = Config::load_from(cli.config.as_deref())
        .map(|config| config.logging)
        .unwrap_or_default();

    let level = match cli.verbose {
        0 => logging.level,
        1 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let format = cli.log_format.unwrap_or(logging.format);
    let (pretty, json) = match format {
        LogFormat::Pretty => (
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            ),
        ),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .try_init();
}

fn default_directives(level: LogLevel) -> String {
    let mut directives = String::from("warn");
    for target in LOG_TARGETS {
        directives.push_str(&format!(",{}={}", target, level.as_str()));
    }
    directives
}

/// Run the CLI with the given arguments.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Serve(args) => commands::serve::run(args, config_path).await,
        Commands::Run(args) => commands::run::run(args, config_path).await,
        Commands::Check(args) => commands::check::run(args, config_path).await,
        Commands::Config(args) => commands::config::run(args, config_path).await,
        Commands::Version => {
            println!("linebox {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
