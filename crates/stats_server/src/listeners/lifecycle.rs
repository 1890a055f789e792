//! Match lifecycle listeners: load, start, party membership and end.
//!
//! These drive the [`LiveMatch`] state machine. Transitions that indicate
//! corrupted state fail with an invariant error; redelivered or premature
//! events are logged and dropped.

use crate::error::MatchError;
use crate::live_match::{JoinOutcome, LiveMatch};
use crate::session::SessionState;
use match_event_system::{
    async_trait, EventCall, EventError, Listener, MatchEndData, MatchId, MatchLoadData, MatchStartData, PartyJoinData,
    PartyLeaveData,
};
use tracing::{debug, info, warn};

/// Creates the session's live match.
pub struct LoadMatch;

#[async_trait]
impl Listener<SessionState, MatchLoadData> for LoadMatch {
    async fn handle(&self, ctx: &mut SessionState, call: &mut EventCall<'_, MatchLoadData>) -> Result<(), EventError> {
        if let Some(current) = ctx.current_match.as_ref().filter(|live| !live.is_ended()) {
            return Err(MatchError::MatchInProgress(current.id).into());
        }

        let data = call.data();
        let live = LiveMatch::load(MatchId::new(), ctx.server_id.clone(), data, ctx.now());
        info!(
            "📝 Match {} loaded on {} (map {}, {} parties)",
            live.id,
            ctx.server_id,
            live.map_id,
            live.parties.len()
        );
        ctx.current_match = Some(live);
        Ok(())
    }
}

/// Starts the match and makes sure every rostered player has a record.
pub struct StartMatch;

#[async_trait]
impl Listener<SessionState, MatchStartData> for StartMatch {
    async fn handle(&self, ctx: &mut SessionState, call: &mut EventCall<'_, MatchStartData>) -> Result<(), EventError> {
        let data = call.data();
        let now = ctx.now();
        let live = ctx.require_match()?;
        live.start(data, now)?;
        info!("🚀 Match {} started with {} rostered players", live.id, data.participants.len());

        let mut first_error = None;
        for entry in &data.participants {
            if let Err(e) = ctx.ensure_player(entry.id, &entry.name).await {
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

pub struct JoinParty;

#[async_trait]
impl Listener<SessionState, PartyJoinData> for JoinParty {
    async fn handle(&self, ctx: &mut SessionState, call: &mut EventCall<'_, PartyJoinData>) -> Result<(), EventError> {
        let data = call.data();
        let now = ctx.now();
        let Some(live) = ctx.current_match.as_mut() else {
            warn!("⚠️ {} joined {} with no match loaded", data.player_name, data.party_name);
            return Ok(());
        };

        match live.join_party(data, now)? {
            JoinOutcome::FirstSighting => {
                debug!("{} joined {} for the first time", data.player_name, data.party_name);
                ctx.ensure_player(data.player_id, &data.player_name).await
            }
            JoinOutcome::Rejoined | JoinOutcome::Switched => {
                debug!("{} moved to {}", data.player_name, data.party_name);
                Ok(())
            }
        }
    }
}

pub struct LeaveParty;

#[async_trait]
impl Listener<SessionState, PartyLeaveData> for LeaveParty {
    async fn handle(&self, ctx: &mut SessionState, call: &mut EventCall<'_, PartyLeaveData>) -> Result<(), EventError> {
        let data = call.data();
        let now = ctx.now();
        let Some(live) = ctx.current_match.as_mut() else {
            warn!("⚠️ {} left a party with no match loaded", data.player_name);
            return Ok(());
        };

        live.leave_party(data, now)?;
        debug!("{} left their party", data.player_name);
        Ok(())
    }
}

/// Moves the match to ENDED. A redelivered or premature end cancels the
/// event so the outcome pass never runs twice.
pub struct EndMatch;

#[async_trait]
impl Listener<SessionState, MatchEndData> for EndMatch {
    async fn handle(&self, ctx: &mut SessionState, call: &mut EventCall<'_, MatchEndData>) -> Result<(), EventError> {
        let now = ctx.now();
        let record = serde_json::to_value(call.data())?;
        let Some(live) = ctx.current_match.as_mut() else {
            warn!("⚠️ Ignoring match end from {}: no match loaded", ctx.server_id);
            call.cancel();
            return Ok(());
        };

        match live.end(record, now) {
            Ok(()) => {
                info!("🏁 Match {} ended after {}ms", live.id, live.length());
                Ok(())
            }
            Err(e) if e.is_benign() => {
                warn!("⚠️ Ignoring match end: {}", e);
                call.cancel();
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
