//! # Stat Listeners
//!
//! The fixed catalog of handlers the stats server registers on its listener
//! bus. Registration happens once at startup in [`build_bus`]; the resulting
//! bus is shared by every session.
//!
//! ## Ordering
//!
//! | Kind | Early | Late |
//! |------|-------|------|
//! | `MATCH_LOAD` | `match-load` | |
//! | `MATCH_START` | `match-start` | |
//! | `PARTY_JOIN` / `PARTY_LEAVE` | `party-join` / `party-leave` | |
//! | `PLAYER_DEATH` | `player-death`, then `player-kill` | `player-death-log` |
//! | `KILLSTREAK` | `player-killstreak` | |
//! | objectives | `objective-*` | |
//! | `MATCH_END` | `match-end` | `match-outcome`, then `match-persist` |
//!
//! Handlers that meet a participant or player they do not know skip that
//! contribution with a warning and carry on.

pub mod combat;
pub mod lifecycle;
pub mod objectives;
pub mod outcome;

use crate::session::SessionState;
use match_event_system::{
    EventPriority, KillstreakData, ListenerBus, MatchEndData, MatchLoadData, MatchStartData, PartyJoinData,
    PartyLeaveData, PlayerDeathData,
};

/// Builds the bus with every stat listener registered.
pub fn build_bus() -> ListenerBus<SessionState> {
    use EventPriority::{Early, Late};

    let mut bus = ListenerBus::new();

    bus.on::<MatchLoadData, _>(Early, "match-load", lifecycle::LoadMatch)
        .on::<MatchStartData, _>(Early, "match-start", lifecycle::StartMatch)
        .on::<PartyJoinData, _>(Early, "party-join", lifecycle::JoinParty)
        .on::<PartyLeaveData, _>(Early, "party-leave", lifecycle::LeaveParty)
        .on::<MatchEndData, _>(Early, "match-end", lifecycle::EndMatch)
        .on::<MatchEndData, _>(Late, "match-outcome", outcome::ApplyOutcome)
        .on::<MatchEndData, _>(Late, "match-persist", outcome::PersistMatch);

    bus.on::<PlayerDeathData, _>(Early, "player-death", combat::CountDeath)
        .on::<PlayerDeathData, _>(Early, "player-kill", combat::CreditKill)
        .on::<PlayerDeathData, _>(Late, "player-death-log", combat::RecordDeath)
        .on::<KillstreakData, _>(Early, "player-killstreak", combat::RecordKillstreak);

    objectives::register(&mut bus);
    bus
}
