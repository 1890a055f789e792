//! In-memory document store

use super::Database;
use crate::error::StoreError;
use crate::live_match::LiveMatch;
use crate::models::{Death, Player};
use async_trait::async_trait;
use dashmap::DashMap;
use match_event_system::{MatchId, PlayerId, ServerId};
use std::sync::atomic::{AtomicU32, Ordering};
use uuid::Uuid;

/// DashMap-backed store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    players: DashMap<PlayerId, Player>,
    matches: DashMap<MatchId, LiveMatch>,
    deaths: DashMap<Uuid, Death>,
    /// Remaining player writes to reject, for exercising retry paths
    failing_writes: AtomicU32,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` player writes fail with `StoreError::Unavailable`.
    pub fn fail_next_player_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    pub fn death_count(&self) -> usize {
        self.deaths.len()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn find_player(&self, id: &PlayerId) -> Result<Option<Player>, StoreError> {
        Ok(self.players.get(id).map(|entry| entry.value().clone()))
    }

    async fn find_player_by_name(&self, name: &str) -> Result<Option<Player>, StoreError> {
        let name_lower = name.to_lowercase();
        Ok(self
            .players
            .iter()
            .find(|entry| entry.value().name_lower == name_lower)
            .map(|entry| entry.value().clone()))
    }

    async fn save_player(&self, player: &Player) -> Result<(), StoreError> {
        let rejected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(StoreError::Unavailable(format!("write of player {} rejected", player.id)));
        }

        self.players.insert(player.id, player.clone());
        Ok(())
    }

    async fn delete_player(&self, id: &PlayerId) -> Result<bool, StoreError> {
        Ok(self.players.remove(id).is_some())
    }

    async fn find_match(&self, id: &MatchId) -> Result<Option<LiveMatch>, StoreError> {
        Ok(self.matches.get(id).map(|entry| entry.value().clone()))
    }

    async fn save_match(&self, document: &LiveMatch) -> Result<(), StoreError> {
        self.matches.insert(document.id, document.clone());
        Ok(())
    }

    async fn delete_match(&self, id: &MatchId) -> Result<bool, StoreError> {
        Ok(self.matches.remove(id).is_some())
    }

    async fn find_matches_by_server(&self, server_id: &ServerId) -> Result<Vec<LiveMatch>, StoreError> {
        let mut matches: Vec<LiveMatch> = self
            .matches
            .iter()
            .filter(|entry| &entry.value().server_id == server_id)
            .map(|entry| entry.value().clone())
            .collect();
        matches.sort_by_key(|document| document.loaded_at);
        Ok(matches)
    }

    async fn save_death(&self, death: &Death) -> Result<(), StoreError> {
        self.deaths.insert(death.id, death.clone());
        Ok(())
    }

    async fn find_deaths_by_player(&self, id: &PlayerId) -> Result<Vec<Death>, StoreError> {
        let mut deaths: Vec<Death> = self
            .deaths
            .iter()
            .filter(|entry| entry.value().involves(id))
            .map(|entry| entry.value().clone())
            .collect();
        deaths.sort_by_key(|death| death.at);
        Ok(deaths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use match_event_system::{DamageCause, SimplePlayer};

    #[tokio::test]
    async fn finds_players_by_any_case() {
        let db = MemoryDatabase::new();
        let player = Player::new(PlayerId::new(), "Notch", 1);
        db.save_player(&player).await.unwrap();

        assert_eq!(db.find_player_by_name("NOTCH").await.unwrap(), Some(player.clone()));
        assert_eq!(db.find_player(&player.id).await.unwrap(), Some(player.clone()));
        assert!(db.delete_player(&player.id).await.unwrap());
        assert!(!db.delete_player(&player.id).await.unwrap());
    }

    #[tokio::test]
    async fn injected_write_failures_run_out() {
        let db = MemoryDatabase::new();
        let player = Player::new(PlayerId::new(), "Notch", 1);
        db.fail_next_player_writes(2);

        assert!(db.save_player(&player).await.is_err());
        assert!(db.save_player(&player).await.is_err());
        assert!(db.save_player(&player).await.is_ok());
        assert_eq!(db.player_count(), 1);
    }

    #[tokio::test]
    async fn id_or_name_lookup() {
        let db = MemoryDatabase::new();
        let player = Player::new(PlayerId::new(), "Dinnerbone", 1);
        db.save_player(&player).await.unwrap();

        let by_id = super::super::find_player_by_id_or_name(&db, &player.id.to_string()).await.unwrap();
        let by_name = super::super::find_player_by_id_or_name(&db, "dinnerbone").await.unwrap();
        assert_eq!(by_id, by_name);
        assert!(by_id.is_some());
    }

    #[tokio::test]
    async fn deaths_are_found_from_either_side() {
        let db = MemoryDatabase::new();
        let (killer, victim, bystander) = (PlayerId::new(), PlayerId::new(), PlayerId::new());
        let death = |attacker: Option<PlayerId>, at: u64| Death {
            id: Uuid::new_v4(),
            match_id: MatchId::new(),
            server_id: ServerId::new("eu-1"),
            victim: SimplePlayer { id: victim, name: "victim".into() },
            attacker: attacker.map(|id| SimplePlayer { id, name: "killer".into() }),
            weapon: None,
            cause: DamageCause::Void,
            at,
        };
        let late = death(Some(killer), 20);
        let early = death(None, 10);
        db.save_death(&late).await.unwrap();
        db.save_death(&early).await.unwrap();

        let victim_side = db.find_deaths_by_player(&victim).await.unwrap();
        assert_eq!(victim_side.iter().map(|d| d.at).collect::<Vec<_>>(), vec![10, 20]);
        assert_eq!(db.find_deaths_by_player(&killer).await.unwrap(), vec![late]);
        assert!(db.find_deaths_by_player(&bystander).await.unwrap().is_empty());
        assert_eq!(db.death_count(), 2);
    }
}
