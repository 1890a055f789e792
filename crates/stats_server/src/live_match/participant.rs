//! Participants and their per-match accumulators.

use crate::models::ObjectiveStats;
use match_event_system::{PlayerId, SimplePlayer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Head-to-head record against one opponent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Duel {
    pub kills: u32,
    pub deaths: u32,
}

/// Counters accumulated for one player during one match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParticipantStats {
    pub kills: u32,
    pub deaths: u32,
    pub void_kills: u32,
    pub void_deaths: u32,
    pub first_bloods: u32,
    pub first_bloods_suffered: u32,
    pub objectives: ObjectiveStats,
    pub weapon_kills: HashMap<String, u32>,
    pub duels: HashMap<PlayerId, Duel>,
    pub killstreaks: HashMap<u32, u32>,
    /// Milliseconds in a party while the match was running
    pub game_playtime: u64,
    /// Milliseconds out of a party after first joining one
    pub time_away: u64,
    pub xp_gained: u64,
}

/// A player's state scoped to one live match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: PlayerId,
    pub name: String,
    /// `None` while spectating or unassigned
    pub party_name: Option<String>,
    pub first_joined_match_at: u64,
    pub joined_party_at: Option<u64>,
    pub left_party_at: Option<u64>,
    pub stats: ParticipantStats,
}

impl Participant {
    pub fn new(id: PlayerId, name: impl Into<String>, now: u64) -> Self {
        Self {
            id,
            name: name.into(),
            party_name: None,
            first_joined_match_at: now,
            joined_party_at: None,
            left_party_at: None,
            stats: ParticipantStats::default(),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.party_name.is_some()
    }

    pub fn simple(&self) -> SimplePlayer {
        SimplePlayer {
            id: self.id,
            name: self.name.clone(),
        }
    }

    /// Moves the participant into `party`, closing any open party or away
    /// interval first. `started_at` is `None` while the match is only loaded;
    /// time before the start never counts.
    pub(crate) fn enter_party(&mut self, party: &str, now: u64, started_at: Option<u64>) {
        if self.is_playing() {
            self.close_party_interval(now, started_at);
        } else if let Some(left_at) = self.left_party_at.take() {
            self.stats.time_away += running_time(left_at, now, started_at);
        }

        self.party_name = Some(party.to_string());
        self.joined_party_at = Some(now);
    }

    /// Leaves the current party. Returns false when there was none.
    pub(crate) fn exit_party(&mut self, now: u64, started_at: Option<u64>) -> bool {
        if !self.is_playing() {
            return false;
        }
        self.close_party_interval(now, started_at);
        self.party_name = None;
        self.left_party_at = Some(now);
        true
    }

    /// Accrues the open interval up to `ended_at` without changing membership.
    pub(crate) fn settle(&mut self, ended_at: u64, started_at: Option<u64>) {
        if self.is_playing() {
            self.close_party_interval(ended_at, started_at);
            self.joined_party_at = Some(ended_at);
        } else if let Some(left_at) = self.left_party_at {
            self.stats.time_away += running_time(left_at, ended_at, started_at);
            self.left_party_at = Some(ended_at);
        }
    }

    fn close_party_interval(&mut self, now: u64, started_at: Option<u64>) {
        if let Some(joined_at) = self.joined_party_at.take() {
            self.stats.game_playtime += running_time(joined_at, now, started_at);
        }
    }
}

/// Length of `[from, to]` that falls after the match start.
fn running_time(from: u64, to: u64, started_at: Option<u64>) -> u64 {
    match started_at {
        Some(started_at) => to.saturating_sub(from.max(started_at)),
        None => 0,
    }
}
