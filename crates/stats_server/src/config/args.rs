//! Command-line argument parsing
//!
//! Flags given here override the matching values from the TOML file.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the stats server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    ///
    /// If the file doesn't exist, a default configuration will be created.
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// WebSocket listen address, e.g. "0.0.0.0:9000"
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Directory for the JSON document store
    ///
    /// Implies the `json` storage backend.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config: PathBuf::from("config.toml"),
            listen: None,
            data_dir: None,
            debug: false,
        }
    }
}
