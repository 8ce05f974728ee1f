//! rpkg - a reproducible R package installer CLI

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "rpkg")]
#[command(author, version, about = "rpkg - reproducible R package installation")]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = "rpkg.toml")]
    config: PathBuf,

    /// Number of worker threads (overrides the configuration file)
    #[arg(long, global = true)]
    threads: Option<usize>,

    /// Log filter when RUST_LOG is unset, e.g. `debug` or `rpkg_core=trace`
    #[arg(long, global = true, default_value = "info")]
    loglevel: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what an installation would do, without building anything
    Plan,
    /// Resolve, build, and install the configured packages
    Install {
        /// Kill any single build running longer than this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.loglevel)),
        )
        .init();

    match cli.command {
        Commands::Plan => cmd::plan::plan(&cli.config, cli.threads),
        Commands::Install { timeout } => cmd::install::install(&cli.config, cli.threads, timeout),
    }
}
