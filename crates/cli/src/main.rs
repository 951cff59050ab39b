//! Strata CLI - strata command

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;
mod util;

/// Strata - snapshot history for a watched directory tree
#[derive(Parser)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch directories and print every snapshot as it is created
    Watch {
        #[command(flatten)]
        config: ConfigArgs,

        /// Print one JSON object per event
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration as TOML
    Config {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

/// Settings shared by every command; flags override the config file
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// Directories to watch (replaces `watch_paths` from the config file)
    pub paths: Vec<PathBuf>,

    /// TOML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Basename glob to ignore (repeatable)
    #[arg(short, long = "ignore", value_name = "PATTERN")]
    pub ignore: Vec<String>,

    /// Aggregation window in milliseconds (default: 10)
    #[arg(long)]
    pub debounce_ms: Option<u64>,

    /// Max concurrent snapshot tasks (default: 32)
    #[arg(long)]
    pub workers: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so `--json` output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch { config, json } => cmd::watch::run(&config, json).await,
        Commands::Config { config } => cmd::config::run(&config),
    }
}
