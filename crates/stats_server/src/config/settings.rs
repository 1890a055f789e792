//! Configuration settings structures
//!
//! Every section has defaults, so a partial TOML file is enough to override a
//! single value.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub cache: CacheSettings,
    pub xp: XpSettings,
    pub logging: LoggingSettings,
}

/// Network and session settings
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct ServerSettings {
    /// Network address to bind the WebSocket listener to
    ///
    /// Format: "IP:PORT" (e.g., "127.0.0.1:9000" for localhost,
    /// "0.0.0.0:9000" for all interfaces)
    pub listen_addr: String,

    /// Seconds between snapshots of a live match to storage; 0 disables them
    pub match_snapshot_interval_secs: u64,

    /// A single event dispatch running longer than this stops the session
    pub handler_stall_timeout_ms: u64,

    /// Capacity of each session's outbound command queue
    pub outbound_queue_capacity: usize,

    /// Seconds a disconnected server's registry entry is kept once nothing
    /// of it is parked
    pub stale_session_retention_secs: u64,
}

/// Durable storage backend
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local maps; everything is lost on exit
    Memory,
    /// One JSON document per record under `data_dir`
    Json,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,
}

/// Player stat cache tuning
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct CacheSettings {
    /// Soft upper bound on cached players before LRU eviction kicks in
    pub capacity: usize,
    /// Extra attempts after a failed write-through before an entry is left dirty
    pub write_retries: u32,
    /// Base delay between attempts, doubled on each retry and capped at 2 s
    pub retry_backoff_ms: u64,
    /// How often the background flusher retries dirty entries
    pub flush_interval_secs: u64,
}

/// XP multiplier and reward amounts (raw, before the multiplier)
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct XpSettings {
    pub multiplier: f32,
    pub kill: u32,
    pub first_blood: u32,
    pub core_leak: u32,
    pub control_point_capture: u32,
    pub destroyable_destroy: u32,
    pub flag_capture: u32,
    pub wool_capture: u32,
    pub win: u32,
    pub match_played: u32,
}

/// Logging system configuration
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct LoggingSettings {
    /// Logging level filter
    ///
    /// Valid values: "trace", "debug", "info", "warn", "error"
    pub level: String,

    /// Enable JSON-formatted log output
    pub json_format: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:9000".to_string(),
            match_snapshot_interval_secs: 60,
            handler_stall_timeout_ms: 30_000,
            outbound_queue_capacity: 256,
            stale_session_retention_secs: 3_600,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Json,
            data_dir: PathBuf::from("data"),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            write_retries: 3,
            retry_backoff_ms: 100,
            flush_interval_secs: 30,
        }
    }
}

impl Default for XpSettings {
    fn default() -> Self {
        Self {
            multiplier: 1.0,
            kill: 40,
            first_blood: 20,
            core_leak: 250,
            control_point_capture: 150,
            destroyable_destroy: 200,
            flag_capture: 250,
            wool_capture: 250,
            win: 200,
            match_played: 100,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}
