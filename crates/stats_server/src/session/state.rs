//! Per-session state handed to every listener.

use super::outbound::Outbound;
use crate::cache::PlayerCache;
use crate::config::XpSettings;
use crate::error::MatchError;
use crate::live_match::LiveMatch;
use crate::models::Player;
use crate::store::Database;
use crate::xp::{multiplied_gain, reported_multiplier, XpReason, XpRewards};
use match_event_system::{Clock, EventError, OutboundCommand, PlayerId, ServerId};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Settings a session applies to its own match.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub xp_multiplier: f32,
    pub rewards: XpRewards,
}

impl SessionConfig {
    pub fn from_settings(settings: &XpSettings) -> Self {
        let rewards = XpRewards::new(settings.clone());
        Self {
            xp_multiplier: rewards.default_multiplier(),
            rewards,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_settings(&XpSettings::default())
    }
}

/// Everything a handler may read or mutate while processing one event from
/// one game server. Owned exclusively by that server's session.
#[derive(Debug)]
pub struct SessionState {
    pub server_id: ServerId,
    pub config: SessionConfig,
    pub current_match: Option<LiveMatch>,
    pub players: Arc<PlayerCache>,
    pub store: Arc<dyn Database>,
    pub outbound: Outbound,
    pub clock: Arc<dyn Clock>,
    /// Match documents whose final save failed, retried on the next snapshot
    pub unsaved_matches: Vec<LiveMatch>,
    pub last_seen_at: u64,
    now: u64,
}

impl SessionState {
    pub fn new(
        server_id: ServerId,
        config: SessionConfig,
        players: Arc<PlayerCache>,
        outbound: Outbound,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now_millis();
        Self {
            server_id,
            config,
            current_match: None,
            store: players.store().clone(),
            players,
            outbound,
            clock,
            unsaved_matches: Vec::new(),
            last_seen_at: now,
            now,
        }
    }

    /// Pins "now" for the event about to be dispatched so every handler sees
    /// the same timestamp.
    pub fn begin_event(&mut self) -> u64 {
        self.now = self.clock.now_millis();
        self.last_seen_at = self.now;
        self.now
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn require_match(&mut self) -> Result<&mut LiveMatch, MatchError> {
        self.current_match.as_mut().ok_or(MatchError::NoCurrentMatch)
    }

    /// The current match, if it is still accepting stat events.
    pub fn active_match(&mut self) -> Option<&mut LiveMatch> {
        self.current_match.as_mut().filter(|live| !live.is_ended())
    }

    // ========================================================================
    // Players
    // ========================================================================

    /// Mutates a durable player through the shared cache. A player with no
    /// record is skipped with a warning.
    pub async fn update_player<F, R>(&self, id: &PlayerId, f: F) -> Result<Option<R>, EventError>
    where
        F: FnOnce(&mut Player) -> R,
    {
        match self.players.modify(id, f).await {
            Ok(Some(result)) => Ok(Some(result)),
            Ok(None) => {
                warn!("⚠️ Player {} has no durable record, skipping", id);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Makes sure a durable record exists for a newly sighted participant.
    pub async fn ensure_player(&self, id: PlayerId, name: &str) -> Result<(), EventError> {
        self.players.ensure(id, name, self.now).await?;
        Ok(())
    }

    // ========================================================================
    // XP
    // ========================================================================

    /// XP a reward is worth on this server after the multiplier.
    pub fn xp_for(&self, reason: XpReason) -> u32 {
        multiplied_gain(self.config.rewards.raw(reason), self.config.xp_multiplier)
    }

    /// Tells the game server about a gain that has already been applied to
    /// the player record, and tallies it on the participant.
    pub fn notify_xp(&mut self, player_id: PlayerId, gain: u32, reason: XpReason) {
        if gain == 0 {
            return;
        }
        if let Some(participant) = self
            .current_match
            .as_mut()
            .and_then(|live| live.participant_mut(&player_id))
        {
            participant.stats.xp_gained += gain as u64;
        }

        self.outbound.call(OutboundCommand::PlayerXpGain {
            player_id,
            gain,
            reason: reason.label().to_string(),
            notify: true,
            multiplier: reported_multiplier(self.config.xp_multiplier),
        });
    }

    /// Applies and announces a single reward.
    pub async fn award_xp(&mut self, player_id: PlayerId, reason: XpReason) -> Result<u32, EventError> {
        let gain = self.xp_for(reason);
        if gain == 0 {
            return Ok(0);
        }
        match self.update_player(&player_id, |player| player.stats.add_xp(gain as u64)).await? {
            Some(_) => {
                self.notify_xp(player_id, gain, reason);
                Ok(gain)
            }
            None => Ok(0),
        }
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    pub fn send_message(&self, message: impl Into<String>, sound: Option<String>, player_ids: Vec<PlayerId>) {
        self.outbound.call(OutboundCommand::Message {
            message: message.into(),
            sound,
            player_ids,
        });
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Saves the current match (if any) and retries earlier failed saves.
    pub async fn snapshot(&mut self) -> usize {
        let mut pending = std::mem::take(&mut self.unsaved_matches);
        let mut saved = 0;

        for document in pending.drain(..) {
            match self.store.save_match(&document).await {
                Ok(()) => {
                    info!("💾 Saved previously failed match {}", document.id);
                    saved += 1;
                }
                Err(e) => {
                    error!("❌ Match {} still unsaved: {}", document.id, e);
                    self.unsaved_matches.push(document);
                }
            }
        }

        if let Some(live) = &self.current_match {
            match self.store.save_match(live).await {
                Ok(()) => saved += 1,
                Err(e) => error!("❌ Snapshot of match {} failed: {}", live.id, e),
            }
        }

        saved
    }

    /// Persists a finished match document; on failure it is kept for retry.
    pub async fn persist_finished(&mut self, document: LiveMatch) {
        match self.store.save_match(&document).await {
            Ok(()) => info!("🏁 Match {} on {} saved", document.id, self.server_id),
            Err(e) => {
                error!("❌ Failed to save finished match {}: {}", document.id, e);
                self.unsaved_matches.push(document);
            }
        }
    }
}
