//! `tierwise` entry point.
//!
//! Configuration is layered: defaults, the `-c` file, then `TIERWISE_*`
//! environment variables. `API_KEY` sets the gateway secret when the
//! configuration has none. `RUST_LOG` overrides the log filter.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tierwise_gateway::cli::{Cli, Commands};
use tierwise_gateway::commands;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(format!(
            "tierwise={level},tierwise_gateway={level},tierwise_foundation={level},tower_http=info"
        ))
    })?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Serve { host, port } => commands::serve(config, host, port).await,
        Commands::Classify { prompt } => commands::classify(config, &prompt),
        Commands::Warm { tier, prompt } => commands::warm(config, &tier, &prompt).await,
        Commands::MigrateClassifier { input, output } => {
            commands::migrate_classifier(&input, &output)
        }
    }
}
