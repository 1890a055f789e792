//! Configuration module for the stats server
//!
//! This module handles command-line arguments, configuration file parsing,
//! and provides default settings for the server.

pub mod args;
pub mod settings;

pub use args::Args;
pub use settings::{
    CacheSettings, Config, LoggingSettings, ServerSettings, StorageBackend, StorageSettings, XpSettings,
};

use anyhow::Result;
use tracing::{info, warn};

/// Load configuration from file or create default configuration
///
/// If the file doesn't exist, a default configuration file is written and the
/// defaults are returned. Command-line overrides from `args` are applied last.
///
/// # Errors
/// * Returns error if file I/O operations fail
/// * Returns error if TOML parsing fails
pub async fn load_config(args: &Args) -> Result<Config> {
    let mut config = if args.config.exists() {
        let config_str = tokio::fs::read_to_string(&args.config).await?;
        match toml::de::from_str::<Config>(&config_str) {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to parse config file {}: {}", args.config.display(), e);
                return Err(e.into());
            }
        }
    } else {
        warn!("Configuration file not found: {}, using defaults", args.config.display());

        let default_config = Config::default();
        let config_str = toml::to_string_pretty(&default_config)?;
        tokio::fs::write(&args.config, config_str).await?;
        info!("Created default configuration file: {}", args.config.display());

        default_config
    };

    apply_overrides(&mut config, args);
    Ok(config)
}

/// Applies command-line flags on top of file values.
pub fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(listen) = &args.listen {
        config.server.listen_addr = listen.clone();
    }
    if let Some(dir) = &args.data_dir {
        config.storage.backend = StorageBackend::Json;
        config.storage.data_dir = dir.clone();
    }
    if args.debug {
        config.logging.level = "debug".to_string();
    }
}
