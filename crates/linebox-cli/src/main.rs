//! linebox CLI entry point.

use clap::Parser;
use linebox_cli::{init_logging, run, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli);

    // Run the command
    run(cli).await
}
