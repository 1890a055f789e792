//! # Durable Records
//!
//! The player document that outlives matches, the counter groups shared
//! between it and the per-match participant accumulator, and the death log.

use match_event_system::{BigStats, DamageCause, MatchId, MessageCounts, PlayerDeathData, PlayerId, ServerId, SimplePlayer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// XP needed per level.
pub const XP_PER_LEVEL: u64 = 5_000;

/// Level for a lifetime XP total. Level 1 starts at 0 XP.
pub fn level_for_xp(xp: u64) -> u32 {
    (1 + xp / XP_PER_LEVEL).min(u32::MAX as u64) as u32
}

// ============================================================================
// Counter groups
// ============================================================================

/// Per-objective counters, used both per match and lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectiveStats {
    pub core_leaks: u32,
    pub control_point_captures: u32,
    pub destroyable_destroys: u32,
    pub destroyable_block_destroys: u32,
    pub flag_captures: u32,
    pub flag_pickups: u32,
    pub flag_drops: u32,
    pub flag_defends: u32,
    /// Milliseconds
    pub total_flag_hold_time: u64,
    pub wool_captures: u32,
    pub wool_pickups: u32,
    pub wool_drops: u32,
    pub wool_defends: u32,
}

/// Lifetime statistics kept on the player document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerStats {
    pub xp: u64,
    pub level: u32,
    pub kills: u32,
    pub deaths: u32,
    pub void_kills: u32,
    pub void_deaths: u32,
    pub first_bloods: u32,
    pub first_bloods_suffered: u32,
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
    pub matches: u32,
    pub matches_present_start: u32,
    pub matches_present_full: u32,
    pub matches_present_end: u32,
    /// Milliseconds spent in a party across all matches
    pub game_playtime: u64,
    pub objectives: ObjectiveStats,
    pub weapon_kills: HashMap<String, u32>,
    /// Killstreak size -> times reached
    pub killstreaks: HashMap<u32, u32>,
    pub blocks_broken: HashMap<String, u32>,
    pub blocks_placed: HashMap<String, u32>,
    pub messages: MessageCounts,
    pub bow_shots_taken: u32,
    pub bow_shots_hit: u32,
    pub damage_given: f64,
    pub damage_taken: f64,
    pub damage_given_bow: f64,
}

impl Default for PlayerStats {
    fn default() -> Self {
        Self {
            xp: 0,
            level: 1,
            kills: 0,
            deaths: 0,
            void_kills: 0,
            void_deaths: 0,
            first_bloods: 0,
            first_bloods_suffered: 0,
            wins: 0,
            losses: 0,
            ties: 0,
            matches: 0,
            matches_present_start: 0,
            matches_present_full: 0,
            matches_present_end: 0,
            game_playtime: 0,
            objectives: ObjectiveStats::default(),
            weapon_kills: HashMap::new(),
            killstreaks: HashMap::new(),
            blocks_broken: HashMap::new(),
            blocks_placed: HashMap::new(),
            messages: MessageCounts::default(),
            bow_shots_taken: 0,
            bow_shots_hit: 0,
            damage_given: 0.0,
            damage_taken: 0.0,
            damage_given_bow: 0.0,
        }
    }
}

impl PlayerStats {
    /// Folds the end-of-match bulk counters into the lifetime totals.
    pub fn merge_big_stats(&mut self, big: &BigStats) {
        if let Some(blocks) = &big.blocks {
            for (block, count) in &blocks.blocks_broken {
                *self.blocks_broken.entry(block.clone()).or_insert(0) += count;
            }
            for (block, count) in &blocks.blocks_placed {
                *self.blocks_placed.entry(block.clone()).or_insert(0) += count;
            }
        }

        self.messages.staff += big.messages.staff;
        self.messages.global += big.messages.global;
        self.messages.team += big.messages.team;
        self.bow_shots_taken += big.bow_shots_taken;
        self.bow_shots_hit += big.bow_shots_hit;
        self.damage_given += big.damage_given;
        self.damage_taken += big.damage_taken;
        self.damage_given_bow += big.damage_given_bow;
    }

    /// Adds XP and recomputes the level. Returns true when the level changed.
    pub fn add_xp(&mut self, gain: u64) -> bool {
        let before = self.level;
        self.xp = self.xp.saturating_add(gain);
        self.level = level_for_xp(self.xp);
        self.level != before
    }
}

// ============================================================================
// Player
// ============================================================================

/// The durable player document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Case-normalized name used for lookups
    pub name_lower: String,
    pub first_seen_at: u64,
    pub last_seen_at: u64,
    #[serde(default)]
    pub stats: PlayerStats,
}

impl Player {
    pub fn new(id: PlayerId, name: impl Into<String>, now: u64) -> Self {
        let name = name.into();
        Self {
            id,
            name_lower: name.to_lowercase(),
            name,
            first_seen_at: now,
            last_seen_at: now,
            stats: PlayerStats::default(),
        }
    }

    /// Refreshes the display name and last-seen time after a sighting.
    pub fn touch(&mut self, name: &str, now: u64) {
        if self.name != name {
            self.name = name.to_string();
            self.name_lower = name.to_lowercase();
        }
        self.last_seen_at = self.last_seen_at.max(now);
    }
}

// ============================================================================
// Death
// ============================================================================

/// One death, stored in its own collection and looked up by either player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Death {
    pub id: Uuid,
    pub match_id: MatchId,
    pub server_id: ServerId,
    pub victim: SimplePlayer,
    /// Absent for environmental deaths
    #[serde(default)]
    pub attacker: Option<SimplePlayer>,
    #[serde(default)]
    pub weapon: Option<String>,
    pub cause: DamageCause,
    pub at: u64,
}

impl Death {
    pub fn from_event(data: &PlayerDeathData, match_id: MatchId, server_id: ServerId, at: u64) -> Self {
        let attacker = data.attacker_id.map(|id| SimplePlayer {
            id,
            name: data.attacker_name.clone().unwrap_or_default(),
        });
        Self {
            id: Uuid::new_v4(),
            match_id,
            server_id,
            victim: SimplePlayer {
                id: data.victim_id,
                name: data.victim_name.clone(),
            },
            attacker,
            weapon: data.weapon.clone(),
            cause: data.cause,
            at,
        }
    }

    /// True when `id` died or did the killing.
    pub fn involves(&self, id: &PlayerId) -> bool {
        self.victim.id == *id || self.attacker.as_ref().is_some_and(|attacker| attacker.id == *id)
    }
}
