//! drpc CLI - walk through registration, discovery and remote calls.

mod commands;
mod greeter;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use drpc::core::DrpcConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "drpc")]
#[command(author, version, about = "drpc - service discovery and remote invocation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run providers and a consumer in-process and call through the proxy
    Demo {
        /// Number of providers to register
        #[arg(short, long, default_value = "3")]
        providers: u16,

        /// Number of remote calls to make
        #[arg(short, long, default_value = "5")]
        calls: u32,
    },

    /// Print the default configuration, or validate a file with --config
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match &cli.config {
        Some(path) => DrpcConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => DrpcConfig::default(),
    };

    match cli.command {
        Commands::Demo { providers, calls } => commands::demo::run(&config, providers, calls).await,
        Commands::Config => commands::config::run(&config, cli.config.is_some()),
    }
}
