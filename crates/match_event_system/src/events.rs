//! # Event Payloads
//!
//! Kind-specific payloads carried by inbound messages from game servers.
//! Every payload is immutable once decoded; handlers only ever see shared
//! references to it.
//!
//! Field names follow the game servers' camelCase JSON. Optional fields
//! default when absent so older plugin builds keep decoding.

use crate::types::{DamageCause, PlayerId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Deref;

// ============================================================================
// Match lifecycle
// ============================================================================

/// A party (team) definition announced when a match loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyData {
    pub name: String,
    pub alias: String,
    pub colour: String,
    pub min: u32,
    pub max: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchLoadData {
    pub map_id: String,
    pub parties: Vec<PartyData>,
}

/// A player on the roster when the match starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub id: PlayerId,
    pub name: String,
    #[serde(default)]
    pub party_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStartData {
    pub participants: Vec<RosterEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockInteractions {
    #[serde(default)]
    pub blocks_broken: HashMap<String, u32>,
    #[serde(default)]
    pub blocks_placed: HashMap<String, u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCounts {
    #[serde(default)]
    pub staff: u32,
    #[serde(default)]
    pub global: u32,
    #[serde(default)]
    pub team: u32,
}

/// Bulk counters a game server only reports once, at match end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BigStats {
    pub blocks: Option<BlockInteractions>,
    pub messages: MessageCounts,
    pub bow_shots_taken: u32,
    pub bow_shots_hit: u32,
    pub damage_given: f64,
    pub damage_taken: f64,
    pub damage_given_bow: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchEndData {
    #[serde(default)]
    pub winning_parties: Vec<String>,
    #[serde(default)]
    pub big_stats: HashMap<PlayerId, BigStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyJoinData {
    pub player_id: PlayerId,
    pub player_name: String,
    pub party_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyLeaveData {
    pub player_id: PlayerId,
    pub player_name: String,
}

// ============================================================================
// Combat
// ============================================================================

/// A player died. Delivered to both the death and the kill handlers; the
/// attacker is absent for environmental deaths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerDeathData {
    pub victim_id: PlayerId,
    pub victim_name: String,
    #[serde(default)]
    pub attacker_id: Option<PlayerId>,
    #[serde(default)]
    pub attacker_name: Option<String>,
    #[serde(default)]
    pub weapon: Option<String>,
    pub cause: DamageCause,
}

impl PlayerDeathData {
    /// True when the victim killed themselves (or was credited as their own attacker).
    pub fn is_self_inflicted(&self) -> bool {
        self.attacker_id == Some(self.victim_id)
    }

    /// Weapon name used for per-weapon kill counters.
    pub fn weapon_name(&self) -> &str {
        self.weapon.as_deref().unwrap_or("NONE")
    }
}

/// Per-player update: a killstreak milestone was reached (or a streak ended).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillstreakData {
    pub player_id: PlayerId,
    pub amount: u32,
    #[serde(default)]
    pub ended: bool,
}

// ============================================================================
// Objectives
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contribution {
    pub player_id: PlayerId,
    #[serde(default)]
    pub percentage: f32,
    #[serde(default)]
    pub block_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreLeakData {
    pub core_id: String,
    #[serde(default)]
    pub party_name: Option<String>,
    pub contributions: Vec<Contribution>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlPointCaptureData {
    pub point_id: String,
    #[serde(default)]
    pub party_name: Option<String>,
    pub player_ids: Vec<PlayerId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestroyableDestroyData {
    pub destroyable_id: String,
    #[serde(default)]
    pub party_name: Option<String>,
    pub contributions: Vec<Contribution>,
}

/// Shared shape of all flag events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagEventData {
    pub flag_id: String,
    pub player_id: PlayerId,
    /// Milliseconds the flag was held; zero for pickups and defends
    #[serde(default)]
    pub held_time: u64,
}

/// Shared shape of all wool events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WoolEventData {
    pub wool_id: String,
    pub player_id: PlayerId,
}

macro_rules! objective_newtype {
    ($($name:ident($inner:ty)),* $(,)?) => {
        $(
            #[derive(Debug, Clone, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(pub $inner);

            impl Deref for $name {
                type Target = $inner;

                fn deref(&self) -> &Self::Target {
                    &self.0
                }
            }
        )*
    };
}

objective_newtype!(
    FlagPlaceData(FlagEventData),
    FlagPickupData(FlagEventData),
    FlagDropData(FlagEventData),
    FlagDefendData(FlagEventData),
    WoolPlaceData(WoolEventData),
    WoolPickupData(WoolEventData),
    WoolDropData(WoolEventData),
    WoolDefendData(WoolEventData),
);
