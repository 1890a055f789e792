//! End-of-match outcome pass and persistence.
//!
//! Both listeners run in the `Late` tier, after the end transition and after
//! every per-event counter for the match has been applied.

use crate::live_match::LiveMatch;
use crate::session::SessionState;
use crate::xp::XpReason;
use match_event_system::{async_trait, BigStats, EventCall, EventError, Listener, MatchEndData, PlayerId};
use tracing::{debug, info};

/// Away time below which a player counts as having played the full match.
pub const FULL_MATCH_MAX_AWAY_MS: u64 = 20_000;

/// What the outcome pass decided for one participant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticipantOutcome {
    pub player_id: PlayerId,
    pub won: bool,
    pub lost: bool,
    pub tied: bool,
    pub present_at_start: bool,
    pub present_full: bool,
    pub present_at_end: bool,
    pub played: bool,
    pub playtime: u64,
}

/// Classifies every participant of an ended, settled match.
pub fn decide_outcomes(live: &LiveMatch, winning_parties: &[String]) -> Vec<ParticipantOutcome> {
    let tie = live.is_tie(winning_parties);
    let minimum_playtime = live.minimum_playtime();
    let started_at = live.started_at.unwrap_or(live.loaded_at);

    live.participants
        .values()
        .map(|participant| {
            let playing = participant.is_playing();
            let in_winners = participant
                .party_name
                .as_ref()
                .is_some_and(|party| winning_parties.contains(party));
            let joined_after_start = participant.first_joined_match_at.saturating_sub(started_at);

            ParticipantOutcome {
                player_id: participant.id,
                tied: tie && playing,
                won: !tie && in_winners,
                lost: !tie && playing && !in_winners,
                present_at_start: (joined_after_start as f64) < minimum_playtime,
                present_full: participant.stats.time_away < FULL_MATCH_MAX_AWAY_MS && playing,
                present_at_end: playing,
                played: participant.stats.game_playtime as f64 > minimum_playtime,
                playtime: participant.stats.game_playtime,
            }
        })
        .collect()
}

/// Folds the match result into every participant's durable record, one
/// write per participant.
pub struct ApplyOutcome;

#[async_trait]
impl Listener<SessionState, MatchEndData> for ApplyOutcome {
    async fn handle(&self, ctx: &mut SessionState, call: &mut EventCall<'_, MatchEndData>) -> Result<(), EventError> {
        let data = call.data();
        let Some(live) = ctx.current_match.as_mut().filter(|live| live.is_ended()) else {
            return Ok(());
        };
        live.settle_participants();
        let outcomes = decide_outcomes(live, &data.winning_parties);
        let match_id = live.id;

        let win_xp = ctx.xp_for(XpReason::Win);
        let played_xp = ctx.xp_for(XpReason::MatchPlayed);
        let mut first_error = None;

        for outcome in outcomes {
            let big_stats: Option<&BigStats> = data.big_stats.get(&outcome.player_id);
            let gain_win = if outcome.won { win_xp } else { 0 };
            let gain_played = if outcome.played { played_xp } else { 0 };

            let updated = ctx
                .update_player(&outcome.player_id, |player| {
                    let stats = &mut player.stats;
                    if let Some(big) = big_stats {
                        stats.merge_big_stats(big);
                    }
                    if outcome.tied {
                        stats.ties += 1;
                    } else if outcome.won {
                        stats.wins += 1;
                    } else if outcome.lost {
                        stats.losses += 1;
                    }
                    if outcome.played {
                        stats.matches += 1;
                    }
                    if outcome.present_at_start {
                        stats.matches_present_start += 1;
                    }
                    if outcome.present_full {
                        stats.matches_present_full += 1;
                    }
                    if outcome.present_at_end {
                        stats.matches_present_end += 1;
                    }
                    stats.game_playtime += outcome.playtime;
                    stats.add_xp(gain_win as u64 + gain_played as u64)
                })
                .await;

            match updated {
                Ok(Some(levelled_up)) => {
                    ctx.notify_xp(outcome.player_id, gain_win, XpReason::Win);
                    ctx.notify_xp(outcome.player_id, gain_played, XpReason::MatchPlayed);
                    if levelled_up {
                        debug!("Player {} levelled up at the end of {}", outcome.player_id, match_id);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        info!("📊 Outcome applied for match {}", match_id);
        first_error.map_or(Ok(()), Err)
    }
}

/// Saves the finished match document and clears the session's match.
pub struct PersistMatch;

#[async_trait]
impl Listener<SessionState, MatchEndData> for PersistMatch {
    async fn handle(&self, ctx: &mut SessionState, _call: &mut EventCall<'_, MatchEndData>) -> Result<(), EventError> {
        if !ctx.current_match.as_ref().is_some_and(LiveMatch::is_ended) {
            return Ok(());
        }
        if let Some(document) = ctx.current_match.take() {
            ctx.persist_finished(document).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use match_event_system::{MatchId, MatchLoadData, MatchStartData, PartyData, PartyJoinData, PartyLeaveData, ServerId};

    fn party(name: &str) -> PartyData {
        PartyData {
            name: name.into(),
            alias: name.into(),
            colour: name.into(),
            min: 1,
            max: 4,
        }
    }

    fn join(id: PlayerId, party: &str) -> PartyJoinData {
        PartyJoinData {
            player_id: id,
            player_name: format!("p-{party}"),
            party_name: party.into(),
        }
    }

    fn ended(joins: &[(PlayerId, &str, u64)], leaves: &[(PlayerId, u64)], end_at: u64) -> LiveMatch {
        let load = MatchLoadData {
            map_id: "harb".into(),
            parties: vec![party("Red"), party("Blue")],
        };
        let mut live = LiveMatch::load(MatchId::new(), ServerId::new("eu-1"), &load, 0);
        live.start(&MatchStartData { participants: vec![] }, 0).unwrap();
        for (id, party, at) in joins {
            live.join_party(&join(*id, party), *at).unwrap();
        }
        for (id, at) in leaves {
            live.leave_party(
                &PartyLeaveData {
                    player_id: *id,
                    player_name: "x".into(),
                },
                *at,
            )
            .unwrap();
        }
        live.end(serde_json::Value::Null, end_at).unwrap();
        live.settle_participants();
        live
    }

    #[test]
    fn loser_gets_exactly_one_loss() {
        let (red, blue) = (PlayerId::new(), PlayerId::new());
        let live = ended(&[(red, "Red", 0), (blue, "Blue", 0)], &[], 600_000);
        let outcomes = decide_outcomes(&live, &["Red".to_string()]);
        let blue = outcomes.iter().find(|o| o.player_id == blue).unwrap();
        let red = outcomes.iter().find(|o| o.player_id == red).unwrap();

        assert!(blue.lost && !blue.won && !blue.tied);
        assert!(red.won && !red.lost && !red.tied);
        assert!(red.present_at_start && red.present_full && red.present_at_end && red.played);
    }

    #[test]
    fn every_party_winning_is_a_tie() {
        let (red, blue) = (PlayerId::new(), PlayerId::new());
        let live = ended(&[(red, "Red", 0), (blue, "Blue", 0)], &[], 600_000);
        let outcomes = decide_outcomes(&live, &["Red".to_string(), "Blue".to_string()]);
        assert!(outcomes.iter().all(|o| o.tied && !o.won && !o.lost));

        let none = decide_outcomes(&live, &[]);
        assert!(none.iter().all(|o| o.tied));
    }

    #[test]
    fn leavers_neither_tie_nor_lose_and_miss_the_full_match() {
        let (stayer, leaver) = (PlayerId::new(), PlayerId::new());
        let live = ended(&[(stayer, "Red", 0), (leaver, "Blue", 0)], &[(leaver, 100_000)], 600_000);
        let outcomes = decide_outcomes(&live, &[]);
        let leaver = outcomes.iter().find(|o| o.player_id == leaver).unwrap();

        assert!(!leaver.tied && !leaver.lost && !leaver.present_at_end && !leaver.present_full);
        assert!(leaver.played);
        assert_eq!(leaver.playtime, 100_000);
    }

    #[test]
    fn late_joiner_is_not_present_at_start() {
        let (early, late) = (PlayerId::new(), PlayerId::new());
        // 600s match: minimum playtime is 60s.
        let live = ended(&[(early, "Red", 10_000), (late, "Blue", 90_000)], &[], 600_000);
        let outcomes = decide_outcomes(&live, &["Red".to_string()]);

        let early = outcomes.iter().find(|o| o.player_id == early).unwrap();
        let late = outcomes.iter().find(|o| o.player_id == late).unwrap();
        assert!(early.present_at_start);
        assert!(!late.present_at_start);
        assert!(late.played);
    }

    /// Red player who steps out for `away` ms mid-match and comes back.
    fn returned_after(away: u64) -> (LiveMatch, PlayerId) {
        let id = PlayerId::new();
        let load = MatchLoadData {
            map_id: "harb".into(),
            parties: vec![party("Red"), party("Blue")],
        };
        let mut live = LiveMatch::load(MatchId::new(), ServerId::new("eu-1"), &load, 0);
        live.start(&MatchStartData { participants: vec![] }, 0).unwrap();
        live.join_party(&join(id, "Red"), 0).unwrap();
        live.leave_party(
            &PartyLeaveData {
                player_id: id,
                player_name: "x".into(),
            },
            100_000,
        )
        .unwrap();
        live.join_party(&join(id, "Red"), 100_000 + away).unwrap();
        live.end(serde_json::Value::Null, 600_000).unwrap();
        live.settle_participants();
        (live, id)
    }

    #[test]
    fn full_match_allows_just_under_twenty_seconds_away() {
        let (live, id) = returned_after(19_999);
        assert_eq!(live.participant(&id).unwrap().stats.time_away, 19_999);
        let outcome = &decide_outcomes(&live, &["Red".to_string()])[0];
        assert!(outcome.present_full && outcome.present_at_end && outcome.won);

        let (live, id) = returned_after(FULL_MATCH_MAX_AWAY_MS);
        assert_eq!(live.participant(&id).unwrap().stats.time_away, 20_000);
        let outcome = &decide_outcomes(&live, &["Red".to_string()])[0];
        assert!(!outcome.present_full);
        assert!(outcome.present_at_end && outcome.present_at_start && outcome.won);
    }

    #[test]
    fn playtime_equal_to_minimum_does_not_count_as_played() {
        let (exact, over) = (PlayerId::new(), PlayerId::new());
        // 600s match: minimum playtime is exactly 60s.
        let live = ended(&[(exact, "Red", 540_000), (over, "Blue", 539_999)], &[], 600_000);
        assert_eq!(live.minimum_playtime(), 60_000.0);
        let outcomes = decide_outcomes(&live, &["Red".to_string()]);

        let exact = outcomes.iter().find(|o| o.player_id == exact).unwrap();
        let over = outcomes.iter().find(|o| o.player_id == over).unwrap();
        assert_eq!(exact.playtime, 60_000);
        assert!(!exact.played);
        assert!(exact.won && exact.present_at_end);
        assert_eq!(over.playtime, 60_001);
        assert!(over.played && over.lost);
    }
}
