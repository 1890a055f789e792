//! Deaths, kills and killstreaks.

use crate::models::Death;
use crate::session::SessionState;
use crate::xp::XpReason;
use match_event_system::{async_trait, EventCall, EventError, KillstreakData, Listener, PlayerDeathData};
use tracing::{debug, warn};

/// Counts the victim's death. Runs for every death, self-inflicted or not.
pub struct CountDeath;

#[async_trait]
impl Listener<SessionState, PlayerDeathData> for CountDeath {
    async fn handle(&self, ctx: &mut SessionState, call: &mut EventCall<'_, PlayerDeathData>) -> Result<(), EventError> {
        let data = call.data();
        let void = data.cause.is_void();
        let Some(live) = ctx.active_match() else {
            return Ok(());
        };
        let Some(victim) = live.participant_mut(&data.victim_id) else {
            warn!("⚠️ Death of unknown participant {} ({})", data.victim_name, data.victim_id);
            return Ok(());
        };

        victim.stats.deaths += 1;
        if void {
            victim.stats.void_deaths += 1;
        }

        ctx.update_player(&data.victim_id, |player| {
            player.stats.deaths += 1;
            if void {
                player.stats.void_deaths += 1;
            }
        })
        .await?;
        Ok(())
    }
}

/// Credits the attacker: kills, weapon kills, duels and first blood.
pub struct CreditKill;

#[async_trait]
impl Listener<SessionState, PlayerDeathData> for CreditKill {
    async fn handle(&self, ctx: &mut SessionState, call: &mut EventCall<'_, PlayerDeathData>) -> Result<(), EventError> {
        let data = call.data();
        let Some(attacker_id) = data.attacker_id else {
            return Ok(());
        };
        if data.is_self_inflicted() {
            debug!("{} killed themselves, no kill credited", data.victim_name);
            return Ok(());
        }

        let now = ctx.now();
        let weapon = data.weapon_name().to_string();
        let void = data.cause.is_void();

        let Some(live) = ctx.active_match() else {
            return Ok(());
        };
        let (Some(attacker), Some(victim)) = (
            live.participant(&attacker_id).map(|p| p.simple()),
            live.participant(&data.victim_id).map(|p| p.simple()),
        ) else {
            warn!(
                "⚠️ Kill of {} by {} references an unknown participant",
                data.victim_id, attacker_id
            );
            return Ok(());
        };

        let first_blood = live.record_first_blood(attacker.clone(), victim.clone(), now);
        if let Some(participant) = live.participant_mut(&attacker.id) {
            let stats = &mut participant.stats;
            stats.kills += 1;
            *stats.weapon_kills.entry(weapon.clone()).or_insert(0) += 1;
            if void {
                stats.void_kills += 1;
            }
            stats.duels.entry(victim.id).or_default().kills += 1;
            if first_blood {
                stats.first_bloods += 1;
            }
        }
        if let Some(participant) = live.participant_mut(&victim.id) {
            participant.stats.duels.entry(attacker.id).or_default().deaths += 1;
            if first_blood {
                participant.stats.first_bloods_suffered += 1;
            }
        }
        let audience: Vec<_> = live.participants.keys().copied().collect();

        let kill_xp = ctx.xp_for(XpReason::Kill);
        let first_blood_xp = if first_blood { ctx.xp_for(XpReason::FirstBlood) } else { 0 };

        let credited = ctx
            .update_player(&attacker.id, |player| {
                let stats = &mut player.stats;
                stats.kills += 1;
                *stats.weapon_kills.entry(weapon).or_insert(0) += 1;
                if void {
                    stats.void_kills += 1;
                }
                if first_blood {
                    stats.first_bloods += 1;
                }
                stats.add_xp(kill_xp as u64 + first_blood_xp as u64)
            })
            .await;

        if let Ok(Some(_)) = credited {
            ctx.notify_xp(attacker.id, kill_xp, XpReason::Kill);
            ctx.notify_xp(attacker.id, first_blood_xp, XpReason::FirstBlood);
        }

        if first_blood {
            ctx.update_player(&victim.id, |player| player.stats.first_bloods_suffered += 1)
                .await?;
            ctx.send_message(
                format!("{} drew first blood against {}!", attacker.name, victim.name),
                None,
                audience,
            );
        }

        credited.map(|_| ())
    }
}

/// Appends the death to the durable death log once the counters are in.
pub struct RecordDeath;

#[async_trait]
impl Listener<SessionState, PlayerDeathData> for RecordDeath {
    async fn handle(&self, ctx: &mut SessionState, call: &mut EventCall<'_, PlayerDeathData>) -> Result<(), EventError> {
        let data = call.data();
        let now = ctx.now();
        let server_id = ctx.server_id.clone();
        let Some(live) = ctx.active_match() else {
            return Ok(());
        };
        let Some(victim) = live.participant(&data.victim_id).map(|p| p.simple()) else {
            return Ok(());
        };

        let mut death = Death::from_event(data, live.id, server_id, now);
        death.victim = victim;
        if let Some(attacker) = death.attacker.as_mut() {
            if let Some(known) = live.participant(&attacker.id) {
                *attacker = known.simple();
            }
        }

        ctx.store.save_death(&death).await?;
        debug!("Recorded death {} of {} in {}", death.id, death.victim.name, death.match_id);
        Ok(())
    }
}

/// Tallies killstreak milestones. Streak-ended notices are ignored.
pub struct RecordKillstreak;

#[async_trait]
impl Listener<SessionState, KillstreakData> for RecordKillstreak {
    async fn handle(&self, ctx: &mut SessionState, call: &mut EventCall<'_, KillstreakData>) -> Result<(), EventError> {
        let data = call.data();
        if data.ended {
            return Ok(());
        }
        let Some(live) = ctx.active_match() else {
            return Ok(());
        };
        let Some(participant) = live.participant_mut(&data.player_id) else {
            warn!("⚠️ Killstreak for unknown participant {}", data.player_id);
            return Ok(());
        };

        *participant.stats.killstreaks.entry(data.amount).or_insert(0) += 1;
        ctx.update_player(&data.player_id, |player| {
            *player.stats.killstreaks.entry(data.amount).or_insert(0) += 1;
        })
        .await?;
        Ok(())
    }
}
