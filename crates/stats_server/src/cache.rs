//! # Player Stat Cache
//!
//! Read-through, write-through cache of durable player records shared by
//! every session.
//!
//! ## Concurrency
//!
//! Each player id maps to its own `tokio::sync::Mutex`, so read-modify-write
//! cycles on the same player are serialized across sessions while different
//! players never contend. The DashMap shard guard is only ever held long
//! enough to clone the entry's `Arc`; it is never held across an `.await`.
//!
//! ## Durability
//!
//! Every mutation is persisted before [`PlayerCache::modify`] returns, with
//! bounded retries and capped exponential backoff. If every attempt fails the entry
//! is kept dirty (and pinned in memory), the failure is logged at `error!`
//! and returned, and the background flusher keeps retrying it until it
//! lands. Dirty entries are also flushed at shutdown.
//!
//! ## Eviction
//!
//! Once more than `capacity` players are cached, the least recently used
//! clean entries that nobody else holds are dropped.

use crate::config::CacheSettings;
use crate::error::CacheError;
use crate::models::Player;
use crate::store::Database;
use dashmap::DashMap;
use match_event_system::PlayerId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Upper bound on a single write-through backoff sleep.
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Delay before retry number `retry` (0-based): doubles from `base_ms`
/// and is capped at [`MAX_RETRY_BACKOFF`].
pub fn retry_backoff(base_ms: u64, retry: u32) -> Duration {
    let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor)).min(MAX_RETRY_BACKOFF)
}

#[derive(Debug)]
struct Slot {
    player: Player,
    dirty: bool,
}

#[derive(Debug)]
struct CacheEntry {
    slot: Mutex<Slot>,
    last_access: AtomicU64,
}

impl CacheEntry {
    fn new(player: Player, dirty: bool, tick: u64) -> Self {
        Self {
            slot: Mutex::new(Slot { player, dirty }),
            last_access: AtomicU64::new(tick),
        }
    }
}

/// Counters describing cache behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub cached: usize,
    pub hits: u64,
    pub misses: u64,
    pub write_failures: u64,
    pub evictions: u64,
}

/// Shared cache of player records in front of a [`Database`].
#[derive(Debug)]
pub struct PlayerCache {
    store: Arc<dyn Database>,
    settings: CacheSettings,
    entries: DashMap<PlayerId, Arc<CacheEntry>>,
    /// Lower-cased name -> id
    names: DashMap<String, PlayerId>,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    write_failures: AtomicU64,
    evictions: AtomicU64,
}

impl PlayerCache {
    pub fn new(store: Arc<dyn Database>, settings: CacheSettings) -> Self {
        Self {
            store,
            settings,
            entries: DashMap::new(),
            names: DashMap::new(),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<dyn Database> {
        &self.store
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Current copy of a player, loading it from storage on a miss.
    pub async fn get(&self, id: &PlayerId) -> Result<Option<Player>, CacheError> {
        match self.lookup(id).await? {
            Some(entry) => Ok(Some(entry.slot.lock().await.player.clone())),
            None => Ok(None),
        }
    }

    /// Case-insensitive lookup by name.
    pub async fn get_by_name(&self, name: &str) -> Result<Option<Player>, CacheError> {
        let name_lower = name.to_lowercase();
        let cached_id = self.names.get(&name_lower).map(|entry| *entry.value());

        if let Some(id) = cached_id {
            if let Some(player) = self.get(&id).await? {
                if player.name_lower == name_lower {
                    return Ok(Some(player));
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let loaded = self
            .store
            .find_player_by_name(&name_lower)
            .await
            .map_err(|e| CacheError::Load(name.to_string(), e))?;

        match loaded {
            Some(player) => {
                let entry = self.insert(player, false);
                let player = entry.slot.lock().await.player.clone();
                Ok(Some(player))
            }
            None => Ok(None),
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Applies `f` to a player under that player's lock and persists the
    /// result. Returns `Ok(None)` when the player exists neither in cache nor
    /// in storage.
    pub async fn modify<F, R>(&self, id: &PlayerId, f: F) -> Result<Option<R>, CacheError>
    where
        F: FnOnce(&mut Player) -> R,
    {
        match self.lookup(id).await? {
            Some(entry) => self.apply(&entry, f).await.map(Some),
            None => Ok(None),
        }
    }

    /// Makes sure a record exists for a player seen in a match, creating it if
    /// needed, and refreshes the name and last-seen time.
    pub async fn ensure(&self, id: PlayerId, name: &str, now: u64) -> Result<Player, CacheError> {
        let entry = match self.lookup(&id).await? {
            Some(entry) => entry,
            None => {
                info!("🆕 First sighting of player {} ({})", name, id);
                self.insert(Player::new(id, name, now), true)
            }
        };

        self.apply(&entry, |player| {
            player.touch(name, now);
            player.clone()
        })
        .await
    }

    /// Replaces a player record wholesale and persists it.
    pub async fn set(&self, player: Player) -> Result<(), CacheError> {
        let id = player.id;
        let entry = self.insert(player.clone(), true);
        self.apply(&entry, move |current| {
            *current = player;
        })
        .await?;
        debug!("Replaced cached player {}", id);
        Ok(())
    }

    /// Retries every dirty entry once. Returns how many are still dirty.
    pub async fn flush_dirty(&self) -> usize {
        let entries: Vec<Arc<CacheEntry>> = self.entries.iter().map(|entry| entry.value().clone()).collect();
        let mut still_dirty = 0;

        for entry in entries {
            let mut slot = entry.slot.lock().await;
            if !slot.dirty {
                continue;
            }
            match self.store.save_player(&slot.player).await {
                Ok(()) => {
                    slot.dirty = false;
                    info!("💾 Flushed pending write for player {}", slot.player.name);
                }
                Err(e) => {
                    still_dirty += 1;
                    self.write_failures.fetch_add(1, Ordering::Relaxed);
                    error!("❌ Player {} still unsaved: {}", slot.player.id, e);
                }
            }
        }

        still_dirty
    }

    /// Runs [`flush_dirty`](Self::flush_dirty) every `flush_interval_secs`.
    pub fn spawn_flusher(self: &Arc<Self>) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let period = Duration::from_secs(self.settings.flush_interval_secs.max(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if cache.dirty_count().await > 0 {
                    let remaining = cache.flush_dirty().await;
                    if remaining > 0 {
                        warn!("⚠️ {} player records still waiting to be persisted", remaining);
                    }
                }
            }
        })
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.entries.contains_key(id)
    }

    pub async fn dirty_count(&self) -> usize {
        let entries: Vec<Arc<CacheEntry>> = self.entries.iter().map(|entry| entry.value().clone()).collect();
        let mut dirty = 0;
        for entry in entries {
            if entry.slot.lock().await.dirty {
                dirty += 1;
            }
        }
        dirty
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            cached: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    async fn lookup(&self, id: &PlayerId) -> Result<Option<Arc<CacheEntry>>, CacheError> {
        let cached = self.entries.get(id).map(|entry| entry.value().clone());
        if let Some(entry) = cached {
            self.hits.fetch_add(1, Ordering::Relaxed);
            entry.last_access.store(self.tick(), Ordering::Relaxed);
            return Ok(Some(entry));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let loaded = self
            .store
            .find_player(id)
            .await
            .map_err(|e| CacheError::Load(id.to_string(), e))?;

        Ok(loaded.map(|player| self.insert(player, false)))
    }

    /// Inserts a record unless another task got there first, in which case
    /// the existing entry wins.
    fn insert(&self, player: Player, dirty: bool) -> Arc<CacheEntry> {
        let id = player.id;
        let name_lower = player.name_lower.clone();
        let tick = self.tick();

        let entry = self
            .entries
            .entry(id)
            .or_insert_with(|| Arc::new(CacheEntry::new(player, dirty, tick)))
            .value()
            .clone();
        entry.last_access.store(tick, Ordering::Relaxed);
        self.names.insert(name_lower, id);

        self.evict_if_needed();
        entry
    }

    async fn apply<F, R>(&self, entry: &Arc<CacheEntry>, f: F) -> Result<R, CacheError>
    where
        F: FnOnce(&mut Player) -> R,
    {
        let mut slot = entry.slot.lock().await;
        let old_name = slot.player.name_lower.clone();

        let result = f(&mut slot.player);
        slot.dirty = true;

        if slot.player.name_lower != old_name {
            self.names.remove_if(&old_name, |_, id| *id == slot.player.id);
            self.names.insert(slot.player.name_lower.clone(), slot.player.id);
        }

        self.write_through(&mut slot).await?;
        Ok(result)
    }

    async fn write_through(&self, slot: &mut Slot) -> Result<(), CacheError> {
        let attempts = self.settings.write_retries.saturating_add(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.store.save_player(&slot.player).await {
                Ok(()) => {
                    slot.dirty = false;
                    return Ok(());
                }
                Err(e) if attempt < attempts => {
                    warn!(
                        "⚠️ Saving player {} failed (attempt {}/{}): {}",
                        slot.player.id, attempt, attempts, e
                    );
                    tokio::time::sleep(retry_backoff(self.settings.retry_backoff_ms, attempt - 1)).await;
                }
                Err(e) => {
                    self.write_failures.fetch_add(1, Ordering::Relaxed);
                    error!(
                        "❌ Player {} could not be persisted after {} attempts, keeping it dirty: {}",
                        slot.player.id, attempt, e
                    );
                    return Err(CacheError::WriteBack {
                        id: slot.player.id,
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }

    fn evict_if_needed(&self) {
        let excess = self.entries.len().saturating_sub(self.settings.capacity);
        if excess == 0 {
            return;
        }

        let mut candidates: Vec<(u64, PlayerId)> = self
            .entries
            .iter()
            .map(|entry| (entry.value().last_access.load(Ordering::Relaxed), *entry.key()))
            .collect();
        candidates.sort_unstable();

        let mut evicted = 0;
        for (_, id) in candidates {
            if evicted == excess {
                break;
            }
            let removed = self.entries.remove_if(&id, |_, entry| {
                Arc::strong_count(entry) == 1
                    && entry.slot.try_lock().map(|slot| !slot.dirty).unwrap_or(false)
            });
            if let Some((id, _)) = removed {
                self.names.retain(|_, named| *named != id);
                evicted += 1;
            }
        }

        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            debug!("Evicted {} cached players", evicted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDatabase;

    fn settings(capacity: usize) -> CacheSettings {
        CacheSettings {
            capacity,
            write_retries: 2,
            retry_backoff_ms: 1,
            flush_interval_secs: 1,
        }
    }

    fn cache_with(db: Arc<MemoryDatabase>, capacity: usize) -> PlayerCache {
        PlayerCache::new(db, settings(capacity))
    }

    #[test]
    fn retry_backoff_doubles_up_to_cap() {
        assert_eq!(retry_backoff(100, 0), Duration::from_millis(100));
        assert_eq!(retry_backoff(100, 1), Duration::from_millis(200));
        assert_eq!(retry_backoff(100, 4), Duration::from_millis(1_600));
        assert_eq!(retry_backoff(100, 5), MAX_RETRY_BACKOFF);
        assert_eq!(retry_backoff(100, 63), MAX_RETRY_BACKOFF);
        assert_eq!(retry_backoff(100, 200), MAX_RETRY_BACKOFF);
        assert_eq!(retry_backoff(u64::MAX, 0), MAX_RETRY_BACKOFF);
    }

    #[tokio::test]
    async fn read_through_loads_from_store() {
        let db = Arc::new(MemoryDatabase::new());
        let player = Player::new(PlayerId::new(), "Notch", 1);
        db.save_player(&player).await.unwrap();

        let cache = cache_with(db, 10);
        assert!(!cache.contains(&player.id));
        assert_eq!(cache.get(&player.id).await.unwrap(), Some(player.clone()));
        assert!(cache.contains(&player.id));
        assert_eq!(cache.get_by_name("NOTCH").await.unwrap().map(|p| p.id), Some(player.id));
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn modify_writes_through() {
        let db = Arc::new(MemoryDatabase::new());
        let cache = cache_with(db.clone(), 10);
        let id = PlayerId::new();
        cache.ensure(id, "Notch", 5).await.unwrap();

        let kills = cache
            .modify(&id, |player| {
                player.stats.kills += 1;
                player.stats.kills
            })
            .await
            .unwrap();

        assert_eq!(kills, Some(1));
        assert_eq!(db.find_player(&id).await.unwrap().unwrap().stats.kills, 1);
        assert_eq!(cache.dirty_count().await, 0);
    }

    #[tokio::test]
    async fn modify_of_unknown_player_is_none() {
        let cache = cache_with(Arc::new(MemoryDatabase::new()), 10);
        let result = cache.modify(&PlayerId::new(), |player| player.stats.kills += 1).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let db = Arc::new(MemoryDatabase::new());
        let cache = cache_with(db.clone(), 10);
        let id = PlayerId::new();
        cache.ensure(id, "Notch", 5).await.unwrap();

        db.fail_next_player_writes(2);
        cache.modify(&id, |player| player.stats.deaths += 1).await.unwrap();
        assert_eq!(db.find_player(&id).await.unwrap().unwrap().stats.deaths, 1);
    }

    #[tokio::test]
    async fn exhausted_retries_keep_entry_dirty_until_flushed() {
        let db = Arc::new(MemoryDatabase::new());
        let cache = cache_with(db.clone(), 10);
        let id = PlayerId::new();
        cache.ensure(id, "Notch", 5).await.unwrap();

        db.fail_next_player_writes(3);
        let err = cache.modify(&id, |player| player.stats.deaths += 1).await.unwrap_err();
        assert!(matches!(err, CacheError::WriteBack { attempts: 3, .. }));

        // Mutation is kept in memory
        assert_eq!(cache.get(&id).await.unwrap().unwrap().stats.deaths, 1);
        assert_eq!(db.find_player(&id).await.unwrap().unwrap().stats.deaths, 0);
        assert_eq!(cache.dirty_count().await, 1);

        assert_eq!(cache.flush_dirty().await, 0);
        assert_eq!(db.find_player(&id).await.unwrap().unwrap().stats.deaths, 1);
        assert_eq!(cache.stats().write_failures, 1);
    }

    #[tokio::test]
    async fn concurrent_modifications_are_serialized() {
        let db = Arc::new(MemoryDatabase::new());
        let cache = Arc::new(cache_with(db.clone(), 10));
        let id = PlayerId::new();
        cache.ensure(id, "Notch", 5).await.unwrap();

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    cache.modify(&id, |player| player.stats.kills += 1).await.unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(cache.get(&id).await.unwrap().unwrap().stats.kills, 32);
        assert_eq!(db.find_player(&id).await.unwrap().unwrap().stats.kills, 32);
    }

    #[tokio::test]
    async fn least_recently_used_clean_entries_are_evicted() {
        let db = Arc::new(MemoryDatabase::new());
        let cache = cache_with(db.clone(), 2);
        let ids: Vec<PlayerId> = (0..3).map(|_| PlayerId::new()).collect();

        cache.ensure(ids[0], "a", 1).await.unwrap();
        cache.ensure(ids[1], "b", 1).await.unwrap();
        cache.get(&ids[0]).await.unwrap();
        cache.ensure(ids[2], "c", 1).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&ids[0]));
        assert!(!cache.contains(&ids[1]));
        assert!(cache.contains(&ids[2]));
        assert_eq!(cache.stats().evictions, 1);

        // Evicted players are still a read-through away
        assert_eq!(cache.get_by_name("b").await.unwrap().map(|p| p.id), Some(ids[1]));
    }

    #[tokio::test]
    async fn dirty_entries_are_never_evicted() {
        let db = Arc::new(MemoryDatabase::new());
        let cache = cache_with(db.clone(), 1);
        let first = PlayerId::new();
        cache.ensure(first, "a", 1).await.unwrap();

        db.fail_next_player_writes(3);
        assert!(cache.modify(&first, |player| player.stats.kills += 1).await.is_err());

        cache.ensure(PlayerId::new(), "b", 1).await.unwrap();
        assert!(cache.contains(&first));
    }

    #[tokio::test]
    async fn rename_updates_name_index() {
        let db = Arc::new(MemoryDatabase::new());
        let cache = cache_with(db, 10);
        let id = PlayerId::new();
        cache.ensure(id, "OldName", 1).await.unwrap();
        cache.ensure(id, "NewName", 2).await.unwrap();

        assert_eq!(cache.get_by_name("newname").await.unwrap().map(|p| p.id), Some(id));
        assert!(cache.get_by_name("oldname").await.unwrap().is_none());
    }
}
