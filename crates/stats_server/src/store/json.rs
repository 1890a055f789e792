//! JSON document store
//!
//! Layout under the data directory:
//!
//! ```text
//! <dir>/players/<player id>.json
//! <dir>/matches/<match id>.json
//! <dir>/deaths/<death id>.json
//! ```
//!
//! Writes go to a `.tmp` sibling, are fsynced, then atomically renamed over
//! the target so a crash never leaves a half-written document behind.

use super::Database;
use crate::error::StoreError;
use crate::live_match::LiveMatch;
use crate::models::{Death, Player};
use async_trait::async_trait;
use match_event_system::{MatchId, PlayerId, ServerId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::{fs as tokio_fs, io::AsyncWriteExt};
use tracing::{debug, error, instrument};

#[derive(Debug)]
pub struct JsonFileDatabase {
    players_dir: PathBuf,
    matches_dir: PathBuf,
    deaths_dir: PathBuf,
}

impl JsonFileDatabase {
    /// Opens (creating if needed) a store rooted at `root`.
    pub async fn open(root: PathBuf) -> Result<Self, StoreError> {
        let players_dir = root.join("players");
        let matches_dir = root.join("matches");
        let deaths_dir = root.join("deaths");

        for dir in [&players_dir, &matches_dir, &deaths_dir] {
            tokio_fs::create_dir_all(dir)
                .await
                .map_err(|e| StoreError::DirectoryCreate(dir.clone(), e))?;
        }

        debug!("Opened JSON store at {}", root.display());
        Ok(Self {
            players_dir,
            matches_dir,
            deaths_dir,
        })
    }

    fn player_path(&self, id: &PlayerId) -> PathBuf {
        self.players_dir.join(format!("{}.json", id))
    }

    fn match_path(&self, id: &MatchId) -> PathBuf {
        self.matches_dir.join(format!("{}.json", id))
    }

    async fn read_document<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
        let contents = match tokio_fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::FileRead(path.to_path_buf(), e)),
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| StoreError::Deserialization(path.to_path_buf(), e))
    }

    async fn write_document<T: Serialize>(path: PathBuf, key: String, document: &T) -> Result<(), StoreError> {
        let temp_path = path.with_extension("tmp");

        let json = serde_json::to_string_pretty(document).map_err(|e| StoreError::Serialization(key, e))?;

        let mut file = tokio_fs::File::create(&temp_path)
            .await
            .map_err(|e| StoreError::FileCreate(temp_path.clone(), e))?;

        file.write_all(json.as_bytes())
            .await
            .map_err(|e| StoreError::FileWrite(temp_path.clone(), e))?;

        file.sync_all()
            .await
            .map_err(|e| StoreError::FileSync(temp_path.clone(), e))?;

        // Atomic rename
        tokio_fs::rename(&temp_path, &path)
            .await
            .map_err(|e| StoreError::FileRename(temp_path, path.clone(), e))?;

        Ok(())
    }

    async fn remove_document(path: PathBuf) -> Result<bool, StoreError> {
        match tokio_fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::FileDelete(path, e)),
        }
    }

    /// Loads every `.json` document in a directory, skipping unreadable ones.
    async fn load_all<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>, StoreError> {
        let mut documents = Vec::new();
        let mut entries = tokio_fs::read_dir(dir)
            .await
            .map_err(|e| StoreError::DirectoryRead(dir.to_path_buf(), e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::DirectoryRead(dir.to_path_buf(), e))?
        {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match Self::read_document::<T>(&path).await {
                Ok(Some(document)) => documents.push(document),
                Ok(None) => {}
                Err(e) => {
                    error!("Failed to load document from {}: {}", path.display(), e);
                    continue;
                }
            }
        }

        Ok(documents)
    }
}

#[async_trait]
impl Database for JsonFileDatabase {
    #[instrument(skip(self))]
    async fn find_player(&self, id: &PlayerId) -> Result<Option<Player>, StoreError> {
        Self::read_document(&self.player_path(id)).await
    }

    #[instrument(skip(self))]
    async fn find_player_by_name(&self, name: &str) -> Result<Option<Player>, StoreError> {
        let name_lower = name.to_lowercase();
        let players: Vec<Player> = Self::load_all(&self.players_dir).await?;
        Ok(players.into_iter().find(|player| player.name_lower == name_lower))
    }

    #[instrument(skip(self, player), fields(player = %player.id))]
    async fn save_player(&self, player: &Player) -> Result<(), StoreError> {
        Self::write_document(self.player_path(&player.id), player.id.to_string(), player).await?;
        debug!("Saved player {}", player.name);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_player(&self, id: &PlayerId) -> Result<bool, StoreError> {
        Self::remove_document(self.player_path(id)).await
    }

    #[instrument(skip(self))]
    async fn find_match(&self, id: &MatchId) -> Result<Option<LiveMatch>, StoreError> {
        Self::read_document(&self.match_path(id)).await
    }

    #[instrument(skip(self, document), fields(match_id = %document.id))]
    async fn save_match(&self, document: &LiveMatch) -> Result<(), StoreError> {
        Self::write_document(self.match_path(&document.id), document.id.to_string(), document).await?;
        debug!("Saved match {} ({} events)", document.id, document.events.len());
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_match(&self, id: &MatchId) -> Result<bool, StoreError> {
        Self::remove_document(self.match_path(id)).await
    }

    #[instrument(skip(self))]
    async fn find_matches_by_server(&self, server_id: &ServerId) -> Result<Vec<LiveMatch>, StoreError> {
        let mut matches: Vec<LiveMatch> = Self::load_all::<LiveMatch>(&self.matches_dir)
            .await?
            .into_iter()
            .filter(|document| &document.server_id == server_id)
            .collect();
        matches.sort_by_key(|document| document.loaded_at);
        Ok(matches)
    }

    #[instrument(skip(self, death), fields(death = %death.id))]
    async fn save_death(&self, death: &Death) -> Result<(), StoreError> {
        let path = self.deaths_dir.join(format!("{}.json", death.id));
        Self::write_document(path, death.id.to_string(), death).await
    }

    #[instrument(skip(self))]
    async fn find_deaths_by_player(&self, id: &PlayerId) -> Result<Vec<Death>, StoreError> {
        let mut deaths: Vec<Death> = Self::load_all::<Death>(&self.deaths_dir)
            .await?
            .into_iter()
            .filter(|death| death.involves(id))
            .collect();
        deaths.sort_by_key(|death| death.at);
        Ok(deaths)
    }
}
