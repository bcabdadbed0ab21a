//! Meridian service binary
//!
//! Usage:
//!   meridian --config config/meridian.toml
//!   meridian --config config/meridian.toml --env production
//!   meridian --print-config

use anyhow::{Context, Result};
use clap::Parser;
use meridian_runtime::{init_logging, run};
use runtime_config::load_config;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "meridian")]
#[command(about = "Multi-timeframe market data and strategy runtime")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Environment overlay (loads environments/<name>.toml next to the config)
    #[arg(short, long)]
    env: Option<String>,

    /// Override the ownership instance id
    #[arg(long)]
    instance_id: Option<String>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref(), args.env.as_deref())
        .context("Failed to load configuration")?;
    if let Some(instance_id) = args.instance_id {
        config.ownership.instance_id = Some(instance_id);
    }

    if args.print_config {
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    init_logging(&config.logging)?;
    info!("Starting Meridian {}", env!("CARGO_PKG_VERSION"));

    run(config, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}
