//! Objective listeners.
//!
//! Every objective event names one or more contributors. Each contributor is
//! credited independently on both the participant and the player record, so
//! an unknown contributor never blocks the others.

use crate::models::ObjectiveStats;
use crate::session::SessionState;
use crate::xp::XpReason;
use match_event_system::{
    async_trait, Contribution, ControlPointCaptureData, CoreLeakData, DestroyableDestroyData, Event, EventCall, EventError,
    EventPriority, FlagDefendData, FlagDropData, FlagPickupData, FlagPlaceData, Listener, ListenerBus, PlayerId,
    WoolDefendData, WoolDropData, WoolPickupData, WoolPlaceData,
};
use tracing::warn;

/// A contributor and the amount attached to their contribution (block count
/// or flag hold time; zero when the event carries none).
type Contributor = (PlayerId, u64);

/// Listener for one objective kind, described by plain function pointers.
pub struct ObjectiveListener<E> {
    contributors: fn(&E) -> Vec<Contributor>,
    apply: fn(&mut ObjectiveStats, u64),
    reward: Option<XpReason>,
}

impl<E> ObjectiveListener<E> {
    pub fn new(
        contributors: fn(&E) -> Vec<Contributor>,
        apply: fn(&mut ObjectiveStats, u64),
        reward: Option<XpReason>,
    ) -> Self {
        Self {
            contributors,
            apply,
            reward,
        }
    }
}

#[async_trait]
impl<E: Event> Listener<SessionState, E> for ObjectiveListener<E> {
    async fn handle(&self, ctx: &mut SessionState, call: &mut EventCall<'_, E>) -> Result<(), EventError> {
        let contributors = (self.contributors)(call.data());
        let apply = self.apply;
        let gain = self.reward.map_or(0, |reason| ctx.xp_for(reason));
        let mut first_error = None;

        for (player_id, amount) in contributors {
            let Some(live) = ctx.active_match() else {
                return Ok(());
            };
            let Some(participant) = live.participant_mut(&player_id) else {
                warn!("⚠️ {} credited to unknown participant {}", E::KIND, player_id);
                continue;
            };
            apply(&mut participant.stats.objectives, amount);

            let updated = ctx
                .update_player(&player_id, |player| {
                    apply(&mut player.stats.objectives, amount);
                    player.stats.add_xp(gain as u64);
                })
                .await;

            match (updated, self.reward) {
                (Ok(Some(())), Some(reason)) => ctx.notify_xp(player_id, gain, reason),
                (Ok(_), _) => {}
                (Err(e), _) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

fn contributions(list: &[Contribution], with_blocks: bool) -> Vec<Contributor> {
    list.iter()
        .map(|c| (c.player_id, if with_blocks { c.block_count as u64 } else { 0 }))
        .collect()
}

fn objective<E: Event>(
    bus: &mut ListenerBus<SessionState>,
    name: &str,
    contributors: fn(&E) -> Vec<Contributor>,
    apply: fn(&mut ObjectiveStats, u64),
    reward: Option<XpReason>,
) {
    bus.on::<E, _>(EventPriority::Early, name, ObjectiveListener::new(contributors, apply, reward));
}

/// Registers one listener per objective kind.
pub fn register(bus: &mut ListenerBus<SessionState>) {
    objective::<CoreLeakData>(
        bus,
        "objective-core-leak",
        |d| contributions(&d.contributions, false),
        |o, _| o.core_leaks += 1,
        Some(XpReason::CoreLeak),
    );
    objective::<ControlPointCaptureData>(
        bus,
        "objective-control-point-capture",
        |d| d.player_ids.iter().map(|id| (*id, 0)).collect(),
        |o, _| o.control_point_captures += 1,
        Some(XpReason::ControlPointCapture),
    );
    objective::<DestroyableDestroyData>(
        bus,
        "objective-destroyable-destroy",
        |d| contributions(&d.contributions, true),
        |o, blocks| {
            o.destroyable_destroys += 1;
            o.destroyable_block_destroys += blocks as u32;
        },
        Some(XpReason::DestroyableDestroy),
    );

    objective::<FlagPlaceData>(
        bus,
        "objective-flag-place",
        |d| vec![(d.player_id, d.held_time)],
        |o, held| {
            o.flag_captures += 1;
            o.total_flag_hold_time += held;
        },
        Some(XpReason::FlagCapture),
    );
    objective::<FlagPickupData>(bus, "objective-flag-pickup", |d| vec![(d.player_id, 0)], |o, _| o.flag_pickups += 1, None);
    objective::<FlagDropData>(
        bus,
        "objective-flag-drop",
        |d| vec![(d.player_id, d.held_time)],
        |o, held| {
            o.flag_drops += 1;
            o.total_flag_hold_time += held;
        },
        None,
    );
    objective::<FlagDefendData>(bus, "objective-flag-defend", |d| vec![(d.player_id, 0)], |o, _| o.flag_defends += 1, None);

    objective::<WoolPlaceData>(
        bus,
        "objective-wool-place",
        |d| vec![(d.player_id, 0)],
        |o, _| o.wool_captures += 1,
        Some(XpReason::WoolCapture),
    );
    objective::<WoolPickupData>(bus, "objective-wool-pickup", |d| vec![(d.player_id, 0)], |o, _| o.wool_pickups += 1, None);
    objective::<WoolDropData>(bus, "objective-wool-drop", |d| vec![(d.player_id, 0)], |o, _| o.wool_drops += 1, None);
    objective::<WoolDefendData>(bus, "objective-wool-defend", |d| vec![(d.player_id, 0)], |o, _| o.wool_defends += 1, None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use match_event_system::EventKind;

    #[test]
    fn destroyable_contributors_carry_block_counts() {
        let (a, b) = (PlayerId::new(), PlayerId::new());
        let list = vec![
            Contribution {
                player_id: a,
                percentage: 75.0,
                block_count: 3,
            },
            Contribution {
                player_id: b,
                percentage: 25.0,
                block_count: 1,
            },
        ];
        assert_eq!(contributions(&list, true), vec![(a, 3), (b, 1)]);
        assert_eq!(contributions(&list, false), vec![(a, 0), (b, 0)]);
    }

    #[test]
    fn every_objective_kind_is_registered() {
        let mut bus = ListenerBus::new();
        register(&mut bus);
        for kind in [
            EventKind::CoreLeak,
            EventKind::DestroyableDestroy,
            EventKind::FlagDrop,
            EventKind::WoolDefend,
        ] {
            assert_eq!(bus.handler_count(kind), 1, "{kind}");
        }
    }
}
