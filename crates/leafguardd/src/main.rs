use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use leafguard_core::telemetry::level_for_verbosity;
use leafguard_core::{init_tracing, LeafguardConfig};
use tokio::net::TcpListener;
use tracing::info;

/// Vision-driven irrigation controller.
#[derive(Parser)]
#[command(name = "leafguardd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "LEAFGUARD_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overrides the config file
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Emit logs as newline-delimited JSON
    #[arg(long)]
    json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json, level_for_verbosity(args.verbose));

    let mut config =
        LeafguardConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    let runtime = leafguardd::acquire(&config)
        .await
        .context("startup failed")?;

    let listener = TcpListener::bind(config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;

    leafguardd::run(runtime, listener, leafguardd::shutdown_signal()).await?;
    info!("leafguardd stopped");
    Ok(())
}
