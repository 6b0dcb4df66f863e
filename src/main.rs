use std::path::PathBuf;

use clap::Parser;
use rustls::crypto::{CryptoProvider, ring};

use market_data_streamer::{Config, StreamManager};

#[derive(Debug, Parser)]
#[command(about = "Streams normalized exchange market data to local subscribers")]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,
}

// ------------------------------------------------------------
// Application entry point
// ------------------------------------------------------------
//
// Responsibilities:
// - Initialize cryptography backend (rustls)
// - Load and validate configuration
// - Build the StreamManager (composition root)
// - Start it, wait for a shutdown signal, stop it
//
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // --------------------------------------------------------
    // rustls >= 0.23 requires an explicit CryptoProvider.
    // Must run exactly once, before the first wss:// connect.
    // --------------------------------------------------------
    CryptoProvider::install_default(ring::default_provider())
        .expect("failed to install rustls CryptoProvider");

    let config = Config::load(&args.config)?;

    let default_level = if config.debug_log() { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let manager = StreamManager::from_config(&config)?;

    // Only a broker bind failure can surface here; it is fatal.
    manager.start().await?;

    shutdown_signal().await;
    manager.stop().await;

    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("Ctrl-C received"),
        _ = terminate => log::info!("SIGTERM received"),
    }
}
