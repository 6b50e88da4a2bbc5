use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod backup;
mod config;
mod control;
mod lock;
mod schedule;
#[cfg(test)]
mod test_support;

#[derive(Parser)]
#[command(name = "world-backup", version)]
#[command(about = "Retention-aware world backups for Minecraft servers", long_about = None)]
struct Cli {
    /// Configuration file, written with defaults when missing
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
    /// Debug logging and in-game status messages
    #[arg(short, long)]
    verbose: bool,
    /// Do not connect to the server console
    #[arg(short, long)]
    dry: bool,
    /// Configure from the environment only, never read or write the config file
    #[arg(long = "default")]
    env_only: bool,
    /// Keep running and back up at the top of every hour
    #[arg(long)]
    repeat: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let config_path = (!cli.env_only).then_some(cli.config.as_path());
    let config = config::resolve(config_path, std::env::vars())
        .context("Failed to load configuration")?;
    config.validate_paths().context("Invalid configuration")?;

    let scheduler = backup::build_scheduler(&config)?;
    let options = backup::RunOptions {
        verbose: cli.verbose,
        dry_run: cli.dry,
    };

    if cli.repeat {
        schedule::run_hourly(&config, &scheduler, options).await
    } else {
        backup::run_once(&config, &scheduler, options).await.map(|_| ())
    }
}
