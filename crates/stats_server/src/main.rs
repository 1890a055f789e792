//! Stats Server - Main Entry Point
//!
//! Loads configuration, opens storage, and serves game server connections
//! until a termination signal arrives.

use anyhow::Result;
use clap::Parser;
use stats_server::{
    config::{self, Args, Config},
    logging, shutdown, store, PlayerCache, StatsServer,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let startup_start = Instant::now();

    let args = Args::parse();

    let config = config::load_config(&args)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    if let Err(e) = logging::setup_logging(&config.logging) {
        eprintln!("Failed to initialize logging: {}", e);
        return Err(anyhow::anyhow!("Failed to initialize logging: {}", e));
    }

    info!("Starting Stats Server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from: {}", args.config.display());

    let database = store::open_database(&config.storage)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open storage: {}", e))?;
    let players = Arc::new(PlayerCache::new(database, config.cache.clone()));
    let flusher = players.spawn_flusher();

    let server = StatsServer::new(&config, players);
    let listener = server.bind().await?;

    let shutdown_receiver = shutdown::setup_shutdown_handler();
    log_server_configuration(&config);
    info!("Startup complete in {:.2?}", startup_start.elapsed());

    tokio::select! {
        result = server.serve(listener) => {
            match result {
                Ok(_) => info!("Server stopped normally"),
                Err(e) => {
                    error!("Server error: {}", e);
                    flusher.abort();
                    return Err(e.into());
                }
            }
        }
        _ = shutdown_receiver => {
            let shutdown_start = Instant::now();
            info!("Shutdown signal received");
            if let Err(e) = server.shutdown().await {
                error!("Error during shutdown: {}", e);
            }
            info!("Server shutdown completed in {:.2?}", shutdown_start.elapsed());
        }
    }

    flusher.abort();
    Ok(())
}

/// Log the final server configuration
fn log_server_configuration(config: &Config) {
    info!("Server configuration:");
    info!("  Listen address: {}", config.server.listen_addr);
    info!("  Storage: {:?} at {}", config.storage.backend, config.storage.data_dir.display());
    info!("  Cache capacity: {}", config.cache.capacity);
    info!("  XP multiplier: {}", config.xp.multiplier);
    info!("  Snapshot interval: {}s", config.server.match_snapshot_interval_secs);
}
