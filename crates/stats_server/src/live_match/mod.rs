//! # Live Match State
//!
//! The authoritative in-memory record of one match on one game server, and
//! the state machine that guards it:
//!
//! ```text
//! LOADED --start--> STARTED --end--> ENDED
//! ```
//!
//! All lifecycle mutation goes through [`LiveMatch::start`],
//! [`LiveMatch::join_party`], [`LiveMatch::leave_party`] and
//! [`LiveMatch::end`], each of which appends to the match's audit log.
//! Handlers may read participants freely and update their stat
//! accumulators through [`LiveMatch::participant_mut`].

pub mod participant;

pub use participant::{Duel, Participant, ParticipantStats};

use crate::error::MatchError;
use match_event_system::{
    EventKind, MatchId, MatchLoadData, MatchStartData, PartyData, PartyJoinData, PartyLeaveData, PlayerId, ServerId,
    SimplePlayer,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Lifecycle state derived from the match timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    Loaded,
    Started,
    Ended,
}

/// One entry of the append-only match log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchLogEntry {
    /// Wire tag of the event kind
    pub kind: String,
    pub at: u64,
    pub data: Value,
}

/// The first kill of a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirstBlood {
    pub attacker: SimplePlayer,
    pub victim: SimplePlayer,
    pub at: u64,
}

/// What a party join did to the participant table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The player had not been seen in this match before
    FirstSighting,
    Rejoined,
    Switched,
}

/// A live match. This is also the match document persisted to storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveMatch {
    pub id: MatchId,
    pub server_id: ServerId,
    pub map_id: String,
    pub loaded_at: u64,
    pub started_at: Option<u64>,
    pub ended_at: Option<u64>,
    pub parties: Vec<PartyData>,
    pub participants: BTreeMap<PlayerId, Participant>,
    pub events: Vec<MatchLogEntry>,
    pub first_blood: Option<FirstBlood>,
}

impl LiveMatch {
    /// Builds a freshly loaded match from a load event.
    pub fn load(id: MatchId, server_id: ServerId, data: &MatchLoadData, now: u64) -> Self {
        let mut live = Self {
            id,
            server_id,
            map_id: data.map_id.clone(),
            loaded_at: now,
            started_at: None,
            ended_at: None,
            parties: data.parties.clone(),
            participants: BTreeMap::new(),
            events: Vec::new(),
            first_blood: None,
        };
        live.record(EventKind::MatchLoad, to_log_value(data), now);
        live
    }

    pub fn state(&self) -> MatchState {
        match (self.started_at, self.ended_at) {
            (_, Some(_)) => MatchState::Ended,
            (Some(_), None) => MatchState::Started,
            (None, None) => MatchState::Loaded,
        }
    }

    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// LOADED -> STARTED. Populates the roster.
    pub fn start(&mut self, data: &MatchStartData, now: u64) -> Result<(), MatchError> {
        match self.state() {
            MatchState::Loaded => {}
            MatchState::Started => return Err(MatchError::AlreadyStarted(self.id)),
            MatchState::Ended => return Err(MatchError::AlreadyEnded(self.id)),
        }

        self.record(EventKind::MatchStart, to_log_value(data), now);
        let started_at = now.max(self.loaded_at);
        self.started_at = Some(started_at);

        for entry in &data.participants {
            let participant = self
                .participants
                .entry(entry.id)
                .or_insert_with(|| Participant::new(entry.id, entry.name.clone(), started_at));

            match &entry.party_name {
                Some(party) if self.parties.iter().any(|p| &p.name == party) => {
                    if participant.party_name.as_ref() != Some(party) {
                        participant.enter_party(party, started_at, Some(started_at));
                    }
                }
                Some(party) => debug!("Roster entry {} names unknown party {}", entry.name, party),
                None => {}
            }
        }

        Ok(())
    }

    /// Puts a player into a party, creating the participant on first sighting.
    pub fn join_party(&mut self, data: &PartyJoinData, now: u64) -> Result<JoinOutcome, MatchError> {
        if self.is_ended() {
            return Err(MatchError::AlreadyEnded(self.id));
        }
        if !self.parties.iter().any(|p| p.name == data.party_name) {
            return Err(MatchError::UnknownParty(data.party_name.clone()));
        }

        self.record(EventKind::PartyJoin, to_log_value(data), now);
        let started_at = self.started_at;

        let outcome = match self.participants.get_mut(&data.player_id) {
            Some(participant) => {
                let outcome = if participant.is_playing() {
                    JoinOutcome::Switched
                } else {
                    JoinOutcome::Rejoined
                };
                participant.name = data.player_name.clone();
                participant.enter_party(&data.party_name, now, started_at);
                outcome
            }
            None => {
                let mut participant = Participant::new(data.player_id, data.player_name.clone(), now);
                participant.enter_party(&data.party_name, now, started_at);
                self.participants.insert(data.player_id, participant);
                JoinOutcome::FirstSighting
            }
        };

        Ok(outcome)
    }

    /// Takes a player out of their party.
    pub fn leave_party(&mut self, data: &PartyLeaveData, now: u64) -> Result<(), MatchError> {
        if self.is_ended() {
            return Err(MatchError::AlreadyEnded(self.id));
        }
        let started_at = self.started_at;
        let participant = self
            .participants
            .get_mut(&data.player_id)
            .filter(|participant| participant.is_playing())
            .ok_or(MatchError::NotInParty(data.player_id))?;

        participant.exit_party(now, started_at);
        self.record(EventKind::PartyLeave, to_log_value(data), now);
        Ok(())
    }

    /// STARTED -> ENDED.
    pub fn end(&mut self, data: Value, now: u64) -> Result<(), MatchError> {
        let started_at = match (self.started_at, self.ended_at) {
            (_, Some(_)) => return Err(MatchError::AlreadyEnded(self.id)),
            (None, None) => return Err(MatchError::NotStarted(self.id)),
            (Some(started_at), None) => started_at,
        };

        self.record(EventKind::MatchEnd, data, now);
        self.ended_at = Some(now.max(started_at));
        Ok(())
    }

    /// Closes every open party/away interval at the end timestamp.
    pub fn settle_participants(&mut self) {
        let Some(ended_at) = self.ended_at else {
            return;
        };
        let started_at = self.started_at;
        for participant in self.participants.values_mut() {
            participant.settle(ended_at, started_at);
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn participant(&self, id: &PlayerId) -> Option<&Participant> {
        self.participants.get(id)
    }

    pub fn participant_mut(&mut self, id: &PlayerId) -> Option<&mut Participant> {
        self.participants.get_mut(id)
    }

    /// Appends a record to the audit log.
    pub fn record(&mut self, kind: EventKind, data: Value, now: u64) {
        self.events.push(MatchLogEntry {
            kind: kind.as_str().to_string(),
            at: now,
            data,
        });
    }

    /// Sets first blood if it is still unset. Returns whether this call set it.
    pub fn record_first_blood(&mut self, attacker: SimplePlayer, victim: SimplePlayer, now: u64) -> bool {
        if self.first_blood.is_some() {
            return false;
        }
        self.first_blood = Some(FirstBlood { attacker, victim, at: now });
        true
    }

    /// Milliseconds between start and end (or 0 if either is unset).
    pub fn length(&self) -> u64 {
        match (self.started_at, self.ended_at) {
            (Some(started_at), Some(ended_at)) => ended_at.saturating_sub(started_at),
            _ => 0,
        }
    }

    /// `min(10% of the match length, 60 seconds)`, in milliseconds.
    pub fn minimum_playtime(&self) -> f64 {
        (0.10 * self.length() as f64).min(60_000.0)
    }

    /// No winners, or every party won.
    pub fn is_tie(&self, winning_parties: &[String]) -> bool {
        winning_parties.is_empty() || winning_parties.len() == self.parties.len()
    }
}

fn to_log_value<T: Serialize>(data: &T) -> Value {
    serde_json::to_value(data).unwrap_or_default()
}
