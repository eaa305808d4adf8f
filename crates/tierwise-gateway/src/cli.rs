//! CLI command definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Tierwise - route prompts to the smallest model tier that can answer them
#[derive(Debug, Parser)]
#[command(name = "tierwise")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path (TOML, YAML or JSON)
    #[arg(short = 'c', long, global = true, env = "TIERWISE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Override the configured bind host
        #[arg(long)]
        host: Option<String>,

        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Classify a prompt and show where it would be routed
    Classify {
        /// Prompt text
        prompt: String,
    },

    /// Load tiers one at a time and run a test prompt on each
    Warm {
        /// Tier name, or `all`
        #[arg(default_value = "all")]
        tier: String,

        /// Prompt sent once each tier is loaded
        #[arg(long, default_value = "Hello, how are you?")]
        prompt: String,
    },

    /// Rewrite a classifier artifact in the current schema
    MigrateClassifier {
        /// Existing artifact (current or legacy schema)
        input: PathBuf,

        /// Destination
        output: PathBuf,
    },
}
