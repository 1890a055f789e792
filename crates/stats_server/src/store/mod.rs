//! # Durable Store Boundary
//!
//! Key-addressed document storage for player, match and death records. The engine
//! only ever talks to [`Database`]; which backend sits behind it is chosen at
//! startup from `[storage]`.
//!
//! - [`MemoryDatabase`] - process-local maps, used in tests and ephemeral runs
//! - [`JsonFileDatabase`] - one JSON document per record on disk

pub mod json;
pub mod memory;

pub use json::JsonFileDatabase;
pub use memory::MemoryDatabase;

use crate::config::{StorageBackend, StorageSettings};
use crate::error::StoreError;
use crate::live_match::LiveMatch;
use crate::models::{Death, Player};
use async_trait::async_trait;
use match_event_system::{MatchId, PlayerId, ServerId};
use std::sync::Arc;

/// Player, match and death document store
#[async_trait]
pub trait Database: Send + Sync + std::fmt::Debug {
    /// Get a player by id
    async fn find_player(&self, id: &PlayerId) -> Result<Option<Player>, StoreError>;

    /// Get a player by case-insensitive name
    async fn find_player_by_name(&self, name: &str) -> Result<Option<Player>, StoreError>;

    /// Insert or replace a player
    async fn save_player(&self, player: &Player) -> Result<(), StoreError>;

    /// Delete a player; returns whether a record existed
    async fn delete_player(&self, id: &PlayerId) -> Result<bool, StoreError>;

    /// Get a match document by id
    async fn find_match(&self, id: &MatchId) -> Result<Option<LiveMatch>, StoreError>;

    /// Insert or replace a match document
    async fn save_match(&self, document: &LiveMatch) -> Result<(), StoreError>;

    /// Delete a match document; returns whether a record existed
    async fn delete_match(&self, id: &MatchId) -> Result<bool, StoreError>;

    /// All match documents recorded for a game server, oldest first
    async fn find_matches_by_server(&self, server_id: &ServerId) -> Result<Vec<LiveMatch>, StoreError>;

    /// Record a death
    async fn save_death(&self, death: &Death) -> Result<(), StoreError>;

    /// Deaths where the player was the victim or the attacker, oldest first
    async fn find_deaths_by_player(&self, id: &PlayerId) -> Result<Vec<Death>, StoreError>;
}

/// Looks a player up by id first, then by name.
pub async fn find_player_by_id_or_name(db: &dyn Database, target: &str) -> Result<Option<Player>, StoreError> {
    if let Ok(id) = PlayerId::from_str(target) {
        if let Some(player) = db.find_player(&id).await? {
            return Ok(Some(player));
        }
    }
    db.find_player_by_name(target).await
}

/// Builds the backend selected in configuration.
pub async fn open_database(settings: &StorageSettings) -> Result<Arc<dyn Database>, StoreError> {
    match settings.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryDatabase::new())),
        StorageBackend::Json => Ok(Arc::new(JsonFileDatabase::open(settings.data_dir.clone()).await?)),
    }
}
