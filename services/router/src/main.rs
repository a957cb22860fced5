//! hyrp router binary.
//!
//! Loads the configuration, brings up tracing, and runs the QUIC
//! listener until SIGINT/SIGTERM.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hyrp_router::config::Config;
use hyrp_router::server::Server;

#[derive(Debug, Parser)]
#[command(name = "hyrp-router", about = "QUIC connection router for the game protocol")]
struct Args {
    /// Path to the config file (YAML or JSON).
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level.
    #[arg(long, default_value = "info", value_parser = ["debug", "info", "warn", "error"])]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over the flag when set.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| args.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Config::load(&args.config)
        .with_context(|| format!("load config {}", args.config.display()))?;
    info!(config = %args.config.display(), "configuration loaded");

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    Server::new(cfg)?.run(shutdown).await?;
    info!("shutdown complete");
    Ok(())
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            {
                Ok(term) => term,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                    shutdown.cancel();
                    return;
                }
            };
            tokio::select! {
                _ = ctrl_c => {}
                _ = term.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        info!("shutdown signal received");
        shutdown.cancel();
    });
}
