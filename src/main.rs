//! Fetch tunnel server.
//!
//! Serves `GET /v1?videoID=<id>` WebSocket sessions and `GET /health`.

use std::path::PathBuf;

use clap::Parser;

use fetch_tunnel::config::{load_config, loader::apply_env_overrides, TunnelConfig};
use fetch_tunnel::extraction::PlayerApiEngine;
use fetch_tunnel::lifecycle::startup;
use fetch_tunnel::observability::logging::init_logging;

#[derive(Parser)]
#[command(name = "fetch-tunnel")]
#[command(about = "Runs media extraction with every fetch tunnelled through the peer", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => {
            let mut config = TunnelConfig::default();
            apply_env_overrides(&mut config);
            config
        }
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "fetch-tunnel starting");

    startup::run(config, PlayerApiEngine::factory()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
