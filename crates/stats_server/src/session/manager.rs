//! Session registry shared by every connection task.
//!
//! Tracks which game servers are connected, when they were last heard from,
//! and the live matches of servers that dropped mid-match so a reconnect can
//! pick them up again.

use super::SessionStats;
use crate::error::ServerError;
use crate::live_match::LiveMatch;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use match_event_system::ServerId;
use tracing::{debug, info, warn};

/// How long a stale entry with nothing parked is kept, unless configured.
pub const DEFAULT_STALE_RETENTION_MS: u64 = 3_600_000;

/// Bookkeeping for one game server, connected or stale.
#[derive(Debug, Clone, Default)]
pub struct SessionInfo {
    pub connected_at: u64,
    pub last_seen_at: u64,
    /// Set once the connection drops; the entry is kept for operators
    pub stale: bool,
    pub stats: SessionStats,
}

/// Match state left behind by a disconnected session.
#[derive(Debug, Clone, Default)]
pub struct ParkedSession {
    pub current_match: Option<LiveMatch>,
    pub unsaved_matches: Vec<LiveMatch>,
}

impl ParkedSession {
    pub fn is_empty(&self) -> bool {
        self.current_match.is_none() && self.unsaved_matches.is_empty()
    }

    /// Every match document held, live or unsaved.
    pub fn documents(&self) -> impl Iterator<Item = &LiveMatch> {
        self.current_match.iter().chain(self.unsaved_matches.iter())
    }

    /// Folds a later disconnect's state into this one. A live match that is
    /// displaced moves to the unsaved list so it still gets persisted.
    pub fn absorb(&mut self, later: ParkedSession) {
        if let Some(live) = later.current_match {
            if let Some(displaced) = self.current_match.replace(live) {
                self.unsaved_matches.push(displaced);
            }
        }
        self.unsaved_matches.extend(later.unsaved_matches);
    }
}

/// Registry of game server sessions.
#[derive(Debug)]
pub struct SessionManager {
    sessions: DashMap<ServerId, SessionInfo>,
    parked: DashMap<ServerId, ParkedSession>,
    stale_retention_ms: u64,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::with_retention(DEFAULT_STALE_RETENTION_MS)
    }
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stale entries with nothing parked are dropped `retention_ms` after
    /// they were last heard from.
    pub fn with_retention(retention_ms: u64) -> Self {
        Self {
            sessions: DashMap::new(),
            parked: DashMap::new(),
            stale_retention_ms: retention_ms,
        }
    }

    /// Registers a connecting server. A server id may only have one live
    /// connection; a reconnect after a drop receives whatever was parked.
    pub fn connect(&self, server_id: &ServerId, now: u64) -> Result<Option<ParkedSession>, ServerError> {
        self.prune_stale(now);

        let fresh = SessionInfo {
            connected_at: now,
            last_seen_at: now,
            stale: false,
            stats: SessionStats::default(),
        };
        // Check and insert under one shard lock.
        match self.sessions.entry(server_id.clone()) {
            Entry::Occupied(existing) if !existing.get().stale => {
                return Err(ServerError::Handshake(format!(
                    "server {} already has a live session",
                    server_id
                )));
            }
            Entry::Occupied(mut existing) => {
                existing.insert(fresh);
            }
            Entry::Vacant(slot) => {
                slot.insert(fresh);
            }
        }

        let parked = self.parked.remove(server_id).map(|(_, parked)| parked);
        if let Some(parked) = &parked {
            if let Some(live) = &parked.current_match {
                info!("🔁 Server {} resumed match {}", server_id, live.id);
            }
        }
        Ok(parked)
    }

    pub fn touch(&self, server_id: &ServerId, now: u64) {
        if let Some(mut info) = self.sessions.get_mut(server_id) {
            info.last_seen_at = info.last_seen_at.max(now);
        }
    }

    pub fn update_stats(&self, server_id: &ServerId, stats: &SessionStats) {
        if let Some(mut info) = self.sessions.get_mut(server_id) {
            info.stats = stats.clone();
        }
    }

    /// Marks a session stale and parks its unfinished state.
    pub fn disconnect(&self, server_id: &ServerId, parked: ParkedSession, now: u64) {
        // Park first so anyone seeing the stale flag also sees the parked match.
        if !parked.is_empty() {
            if let Some(live) = &parked.current_match {
                warn!("⚠️ Server {} disconnected during match {}, parking it", server_id, live.id);
            }
            self.parked.entry(server_id.clone()).or_default().absorb(parked);
        }

        if let Some(mut info) = self.sessions.get_mut(server_id) {
            info.stale = true;
            info.last_seen_at = info.last_seen_at.max(now);
        }
    }

    /// Drops stale entries past the retention window. Entries that still
    /// have parked matches are kept until a reconnect collects them.
    pub fn prune_stale(&self, now: u64) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|server_id, info| {
            !info.stale
                || now.saturating_sub(info.last_seen_at) < self.stale_retention_ms
                || self.parked.contains_key(server_id)
        });
        let pruned = before.saturating_sub(self.sessions.len());
        if pruned > 0 {
            debug!("Pruned {} stale sessions", pruned);
        }
        pruned
    }

    pub fn is_connected(&self, server_id: &ServerId) -> bool {
        self.sessions.get(server_id).map(|info| !info.stale).unwrap_or(false)
    }

    pub fn session(&self, server_id: &ServerId) -> Option<SessionInfo> {
        self.sessions.get(server_id).map(|info| info.clone())
    }

    pub fn live_count(&self) -> usize {
        self.sessions.iter().filter(|entry| !entry.stale).count()
    }

    pub fn sessions(&self) -> Vec<(ServerId, SessionInfo)> {
        self.sessions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn parked_count(&self) -> usize {
        self.parked.len()
    }

    /// Copies of every parked match document, for the shutdown snapshot.
    pub fn parked_matches(&self) -> Vec<LiveMatch> {
        self.parked
            .iter()
            .flat_map(|entry| entry.value().documents().cloned().collect::<Vec<_>>())
            .collect()
    }
}
