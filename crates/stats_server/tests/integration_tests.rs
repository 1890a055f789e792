//! End-to-end tests: whole event streams through a session, and a real
//! WebSocket connection to a running server.

use futures::{SinkExt, StreamExt};
use match_event_system::{
    async_trait, EventCall, EventError, EventPriority, KillstreakData, Listener, ListenerBus, ManualClock,
    OutboundCommand, PlayerId, ServerId,
};
use serde_json::{json, Value};
use stats_server::config::{CacheSettings, Config, StorageBackend};
use stats_server::listeners::build_bus;
use stats_server::session::{Outbound, SessionConfig};
use stats_server::{Database, MemoryDatabase, PlayerCache, ServerError, ServerSession, SessionState, StatsServer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

// ============================================================================
// Helpers
// ============================================================================

struct Harness {
    session: ServerSession,
    players: Arc<PlayerCache>,
    db: Arc<MemoryDatabase>,
    clock: ManualClock,
    commands: mpsc::Receiver<OutboundCommand>,
}

impl Harness {
    fn new() -> Self {
        Self::with_bus(build_bus(), Duration::from_secs(5))
    }

    fn with_bus(bus: ListenerBus<SessionState>, stall_timeout: Duration) -> Self {
        let db = Arc::new(MemoryDatabase::new());
        let players = Arc::new(PlayerCache::new(db.clone(), CacheSettings::default()));
        let clock = ManualClock::new(1_000);
        let (outbound, commands) = Outbound::channel(256);
        let state = SessionState::new(
            ServerId::new("eu-1"),
            SessionConfig::default(),
            Arc::clone(&players),
            outbound,
            Arc::new(clock.clone()),
        );

        Self {
            session: ServerSession::new(state, Arc::new(bus), stall_timeout),
            players,
            db,
            clock,
            commands,
        }
    }

    async fn send(&mut self, at: u64, kind: &str, data: Value) {
        self.clock.set(at);
        let frame = json!({ "v": 1, "e": kind, "d": data }).to_string();
        self.session.handle_text(&frame).await.unwrap();
    }

    async fn stats(&self, id: PlayerId) -> stats_server::PlayerStats {
        self.players.get(&id).await.unwrap().unwrap().stats
    }

    fn drain_commands(&mut self) -> Vec<OutboundCommand> {
        let mut out = Vec::new();
        while let Ok(command) = self.commands.try_recv() {
            out.push(command);
        }
        out
    }
}

fn load(parties: &[&str]) -> Value {
    let parties: Vec<Value> = parties
        .iter()
        .map(|name| json!({ "name": name, "alias": name, "colour": "RED", "min": 1, "max": 8 }))
        .collect();
    json!({ "mapId": "harb", "parties": parties })
}

fn start(roster: &[(PlayerId, &str, Option<&str>)]) -> Value {
    let participants: Vec<Value> = roster
        .iter()
        .map(|(id, name, party)| json!({ "id": id, "name": name, "partyName": party }))
        .collect();
    json!({ "participants": participants })
}

fn kill(attacker: PlayerId, victim: PlayerId, weapon: &str) -> Value {
    json!({
        "victimId": victim,
        "victimName": "victim",
        "attackerId": attacker,
        "attackerName": "attacker",
        "weapon": weapon,
        "cause": "PROJECTILE",
    })
}

fn end(winners: &[&str]) -> Value {
    json!({ "winningParties": winners, "bigStats": {} })
}

/// Loads and starts a Red/Blue match with A on Red and B on Blue.
async fn red_vs_blue(h: &mut Harness) -> (PlayerId, PlayerId) {
    let (a, b) = (PlayerId::new(), PlayerId::new());
    h.send(1_000, "MATCH_LOAD", load(&["Red", "Blue"])).await;
    h.send(2_000, "MATCH_START", start(&[(a, "A", Some("Red")), (b, "B", Some("Blue"))]))
        .await;
    (a, b)
}

// ============================================================================
// Session scenarios
// ============================================================================

#[tokio::test]
async fn test_kill_then_win_scenario() {
    let mut h = Harness::new();
    let (a, b) = red_vs_blue(&mut h).await;

    h.send(10_000, "PLAYER_DEATH", kill(a, b, "BOW")).await;
    h.send(602_000, "MATCH_END", end(&["Red"])).await;

    let a_stats = h.stats(a).await;
    let b_stats = h.stats(b).await;
    assert_eq!(a_stats.kills, 1);
    assert_eq!(a_stats.weapon_kills.get("BOW"), Some(&1));
    assert_eq!(a_stats.first_bloods, 1);
    assert_eq!(a_stats.wins, 1);
    assert_eq!(a_stats.losses, 0);
    assert_eq!(b_stats.deaths, 1);
    assert_eq!(b_stats.first_bloods_suffered, 1);
    assert_eq!(b_stats.losses, 1);
    assert_eq!(b_stats.wins, 0);

    // kill 40 + first blood 20 + win 200 + match played 100
    assert_eq!(a_stats.xp, 360);
    assert_eq!(b_stats.xp, 100);
    assert_eq!(a_stats.matches, 1);
    assert_eq!(a_stats.matches_present_start, 1);
    assert_eq!(a_stats.matches_present_full, 1);
    assert_eq!(a_stats.game_playtime, 600_000);

    // The finished match was persisted and released.
    assert!(h.session.state().current_match.is_none());
    let saved = h.db.find_matches_by_server(&ServerId::new("eu-1")).await.unwrap();
    assert_eq!(saved.len(), 1);
    let document = &saved[0];
    assert_eq!(document.first_blood.as_ref().unwrap().attacker.id, a);
    assert_eq!(document.participants[&a].stats.duels[&b].kills, 1);
    assert_eq!(document.participants[&b].stats.duels[&a].deaths, 1);
    assert_eq!(document.participants[&a].stats.xp_gained, 360);

    let commands = h.drain_commands();
    assert!(commands.iter().any(|c| matches!(c,
        OutboundCommand::PlayerXpGain { player_id, gain: 40, reason, multiplier: None, .. }
            if *player_id == a && reason == "Kill")));
    assert!(commands
        .iter()
        .any(|c| matches!(c, OutboundCommand::Message { player_ids, .. } if player_ids.len() == 2)));
}

#[tokio::test]
async fn test_destroyable_contributions_credit_each_contributor() {
    let mut h = Harness::new();
    let (p1, p2) = (PlayerId::new(), PlayerId::new());
    h.send(1_000, "MATCH_LOAD", load(&["Red", "Blue"])).await;
    h.send(2_000, "MATCH_START", start(&[(p1, "P1", Some("Red")), (p2, "P2", Some("Red"))]))
        .await;

    h.send(
        5_000,
        "DESTROYABLE_DESTROY",
        json!({
            "destroyableId": "monument",
            "partyName": "Blue",
            "contributions": [
                { "playerId": p1, "percentage": 75.0, "blockCount": 3 },
                { "playerId": p2, "percentage": 25.0, "blockCount": 1 },
            ],
        }),
    )
    .await;

    let s1 = h.stats(p1).await;
    let s2 = h.stats(p2).await;
    assert_eq!(s1.objectives.destroyable_destroys, 1);
    assert_eq!(s2.objectives.destroyable_destroys, 1);
    assert_eq!(s1.objectives.destroyable_block_destroys, 3);
    assert_eq!(s2.objectives.destroyable_block_destroys, 1);

    let live = h.session.state().current_match.as_ref().unwrap();
    assert_eq!(live.participants[&p1].stats.objectives.destroyable_block_destroys, 3);
    assert_eq!(live.events.last().unwrap().kind, "DESTROYABLE_DESTROY");
}

#[tokio::test]
async fn test_unknown_contributor_does_not_block_others() {
    let mut h = Harness::new();
    let (a, _b) = red_vs_blue(&mut h).await;
    let stranger = PlayerId::new();

    h.send(
        3_000,
        "CORE_LEAK",
        json!({
            "coreId": "core",
            "contributions": [{ "playerId": stranger }, { "playerId": a }],
        }),
    )
    .await;
    h.send(3_500, "PLAYER_DEATH", kill(stranger, stranger, "NONE")).await;

    assert_eq!(h.stats(a).await.objectives.core_leaks, 1);
    assert!(h.players.get(&stranger).await.unwrap().is_none());
    assert_eq!(h.session.stats().invariant_violations, 0);
}

#[tokio::test]
async fn test_tie_and_redelivered_end() {
    let mut h = Harness::new();
    let (a, b) = red_vs_blue(&mut h).await;

    h.send(100_000, "MATCH_END", end(&["Red", "Blue"])).await;
    h.send(100_500, "MATCH_END", end(&["Red", "Blue"])).await;

    for id in [a, b] {
        let stats = h.stats(id).await;
        assert_eq!(stats.ties, 1);
        assert_eq!(stats.wins, 0);
        assert_eq!(stats.losses, 0);
    }
    assert_eq!(h.db.match_count(), 1);
}

#[tokio::test]
async fn test_self_kill_counts_only_the_death() {
    let mut h = Harness::new();
    let (a, _b) = red_vs_blue(&mut h).await;

    h.send(3_000, "PLAYER_DEATH", kill(a, a, "TNT")).await;

    let stats = h.stats(a).await;
    assert_eq!(stats.deaths, 1);
    assert_eq!(stats.kills, 0);
    assert_eq!(stats.first_bloods, 0);
    let live = h.session.state().current_match.as_ref().unwrap();
    assert!(live.first_blood.is_none());
    assert!(live.participants[&a].stats.duels.is_empty());
}

#[tokio::test]
async fn test_first_blood_is_recorded_once() {
    let mut h = Harness::new();
    let (a, b) = red_vs_blue(&mut h).await;

    h.send(3_000, "PLAYER_DEATH", kill(a, b, "SWORD")).await;
    h.send(4_000, "PLAYER_DEATH", kill(b, a, "SWORD")).await;
    h.send(5_000, "PLAYER_DEATH", kill(a, b, "SWORD")).await;

    assert_eq!(h.stats(a).await.first_bloods, 1);
    assert_eq!(h.stats(a).await.kills, 2);
    assert_eq!(h.stats(b).await.first_bloods, 0);
    assert_eq!(h.stats(b).await.first_bloods_suffered, 1);
    let live = h.session.state().current_match.as_ref().unwrap();
    assert_eq!(live.first_blood.as_ref().unwrap().at, 3_000);
}

#[tokio::test]
async fn test_deaths_are_logged_for_victim_and_attacker() {
    let mut h = Harness::new();
    let (a, b) = red_vs_blue(&mut h).await;
    let stranger = PlayerId::new();

    h.send(3_000, "PLAYER_DEATH", kill(a, b, "BOW")).await;
    h.send(
        4_000,
        "PLAYER_DEATH",
        json!({ "victimId": a, "victimName": "A", "cause": "VOID" }),
    )
    .await;
    h.send(5_000, "PLAYER_DEATH", kill(a, stranger, "BOW")).await;

    let by_a = h.db.find_deaths_by_player(&a).await.unwrap();
    assert_eq!(by_a.iter().map(|d| d.at).collect::<Vec<_>>(), vec![3_000, 4_000]);
    let bow_kill = &by_a[0];
    // Names come from the match roster rather than the event payload.
    assert_eq!(bow_kill.victim.name, "B");
    assert_eq!(bow_kill.attacker.as_ref().map(|p| p.name.as_str()), Some("A"));
    assert_eq!(bow_kill.weapon.as_deref(), Some("BOW"));
    assert!(by_a[1].attacker.is_none());

    let by_b = h.db.find_deaths_by_player(&b).await.unwrap();
    assert_eq!(by_b, vec![bow_kill.clone()]);
    assert_eq!(by_b[0].match_id, h.session.state().current_match.as_ref().unwrap().id);

    // Unknown victims are skipped like every other stat.
    assert!(h.db.find_deaths_by_player(&stranger).await.unwrap().is_empty());
    assert_eq!(h.db.death_count(), 2);
}

#[tokio::test]
async fn test_party_moves_and_killstreaks() {
    let mut h = Harness::new();
    let (a, _b) = red_vs_blue(&mut h).await;
    let late = PlayerId::new();

    h.send(3_000, "PARTY_JOIN", json!({ "playerId": late, "playerName": "Late", "partyName": "Blue" }))
        .await;
    h.send(4_000, "PARTY_JOIN", json!({ "playerId": late, "playerName": "Late", "partyName": "Green" }))
        .await;
    h.send(5_000, "PARTY_LEAVE", json!({ "playerId": late, "playerName": "Late" })).await;
    h.send(5_500, "PARTY_LEAVE", json!({ "playerId": late, "playerName": "Late" })).await;
    h.send(6_000, "KILLSTREAK", json!({ "playerId": a, "amount": 5 })).await;
    h.send(6_500, "KILLSTREAK", json!({ "playerId": a, "amount": 5, "ended": true })).await;

    let live = h.session.state().current_match.as_ref().unwrap();
    let participant = &live.participants[&late];
    assert!(participant.party_name.is_none());
    assert_eq!(participant.stats.game_playtime, 2_000);
    assert_eq!(live.participants[&a].stats.killstreaks.get(&5), Some(&1));

    // First sighting created a durable record.
    let player = h.players.get(&late).await.unwrap().unwrap();
    assert_eq!(player.first_seen_at, 3_000);
    assert_eq!(h.stats(a).await.killstreaks.get(&5), Some(&1));
}

#[tokio::test]
async fn test_presence_thresholds_reach_the_durable_record() {
    let mut h = Harness::new();
    let (a, b) = red_vs_blue(&mut h).await;
    let late = PlayerId::new();

    // B is away for 27s, over the 20s full-match allowance.
    h.send(3_000, "PARTY_LEAVE", json!({ "playerId": b, "playerName": "B" })).await;
    h.send(30_000, "PARTY_JOIN", json!({ "playerId": b, "playerName": "B", "partyName": "Blue" }))
        .await;
    // 600s match: 59s of play is under the 60s minimum.
    h.send(543_000, "PARTY_JOIN", json!({ "playerId": late, "playerName": "Late", "partyName": "Blue" }))
        .await;
    h.send(602_000, "MATCH_END", end(&["Red"])).await;

    let stored = |id: PlayerId| {
        let db = h.db.clone();
        async move { db.find_player(&id).await.unwrap().unwrap().stats }
    };
    let (a_stats, b_stats, late_stats) = (stored(a).await, stored(b).await, stored(late).await);

    assert_eq!(a_stats.matches, 1);
    assert_eq!(a_stats.matches_present_full, 1);

    assert_eq!(b_stats.matches, 1);
    assert_eq!(b_stats.matches_present_start, 1);
    assert_eq!(b_stats.matches_present_full, 0);
    assert_eq!(b_stats.matches_present_end, 1);
    assert_eq!(b_stats.game_playtime, 573_000);

    assert_eq!(late_stats.matches, 0);
    assert_eq!(late_stats.matches_present_start, 0);
    assert_eq!(late_stats.matches_present_end, 1);
    assert_eq!(late_stats.losses, 1);
    assert_eq!(late_stats.game_playtime, 59_000);
    // Loss earns nothing and the match did not count as played.
    assert_eq!(late_stats.xp, 0);
}

// ============================================================================
// Error taxonomy
// ============================================================================

#[tokio::test]
async fn test_protocol_errors_are_dropped() {
    let mut h = Harness::new();

    h.session.handle_text("not json").await.unwrap();
    h.session.handle_text(r#"{"e":"TELEPORT","d":{}}"#).await.unwrap();
    h.session.handle_text(r#"{"e":"KILLSTREAK","d":{"amount":"many"}}"#).await.unwrap();
    h.session.handle_text(r#"{"v":9,"e":"KILLSTREAK","d":{}}"#).await.unwrap();

    let stats = h.session.stats();
    assert_eq!(stats.received, 4);
    assert_eq!(stats.rejected, 4);
    assert_eq!(stats.dispatched, 0);

    // The session still works afterwards.
    h.send(1_000, "MATCH_LOAD", load(&["Red"])).await;
    assert!(h.session.state().current_match.is_some());
}

#[tokio::test]
async fn test_invariant_violations_are_counted() {
    let mut h = Harness::new();

    h.send(1_000, "MATCH_START", start(&[])).await;
    assert_eq!(h.session.stats().invariant_violations, 1);

    h.send(1_500, "MATCH_LOAD", load(&["Red", "Blue"])).await;
    let first = h.session.state().current_match.as_ref().unwrap().id;
    h.send(2_000, "MATCH_LOAD", load(&["Red", "Blue"])).await;
    assert_eq!(h.session.stats().invariant_violations, 2);
    assert_eq!(h.session.state().current_match.as_ref().unwrap().id, first);

    // A premature end is benign.
    h.send(2_500, "MATCH_END", end(&[])).await;
    assert_eq!(h.session.stats().invariant_violations, 2);
    assert!(h.session.state().current_match.is_some());
}

struct Sleepy;

#[async_trait]
impl Listener<SessionState, KillstreakData> for Sleepy {
    async fn handle(&self, _ctx: &mut SessionState, _call: &mut EventCall<'_, KillstreakData>) -> Result<(), EventError> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(())
    }
}

#[tokio::test]
async fn test_stalled_handler_stops_the_session() {
    let mut bus = build_bus();
    bus.on::<KillstreakData, _>(EventPriority::Late, "sleepy", Sleepy);
    let mut h = Harness::with_bus(bus, Duration::from_millis(50));

    let frame = json!({ "e": "KILLSTREAK", "d": { "playerId": PlayerId::new(), "amount": 3 } }).to_string();
    let result = h.session.handle_text(&frame).await;
    assert!(matches!(result, Err(ServerError::Stalled(_))));
}

#[tokio::test]
async fn test_failed_player_write_is_retried_by_flush() {
    let mut h = Harness::new();
    let (_a, b) = red_vs_blue(&mut h).await;

    // Exhaust the write-through retries for the next death.
    h.db.fail_next_player_writes(CacheSettings::default().write_retries + 1);
    h.send(
        3_000,
        "PLAYER_DEATH",
        json!({ "victimId": b, "victimName": "B", "cause": "VOID" }),
    )
    .await;
    assert_eq!(h.players.dirty_count().await, 1);
    assert_eq!(h.session.stats().handler_failures, 1);

    assert_eq!(h.players.flush_dirty().await, 0);
    let stored = h.db.find_player(&b).await.unwrap().unwrap();
    assert_eq!(stored.stats.deaths, 1);
    assert_eq!(stored.stats.void_deaths, 1);
}

// ============================================================================
// WebSocket
// ============================================================================

async fn running_server() -> (Arc<StatsServer>, Arc<MemoryDatabase>, String) {
    let mut config = Config::default();
    config.server.listen_addr = "127.0.0.1:0".to_string();
    config.storage.backend = StorageBackend::Memory;

    let db = Arc::new(MemoryDatabase::new());
    let players = Arc::new(PlayerCache::new(db.clone(), config.cache.clone()));
    let server = Arc::new(StatsServer::new(&config, players));
    let listener = server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();

    let serving = Arc::clone(&server);
    tokio::spawn(async move { serving.serve(listener).await });

    (server, db, format!("ws://{}", addr))
}

async fn connect(
    url: &str,
    server_id: &'static str,
) -> tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>> {
    let mut request = url.into_client_request().unwrap();
    request
        .headers_mut()
        .insert("X-Server-Id", HeaderValue::from_static(server_id));
    let (ws, _) = tokio_tungstenite::connect_async(request).await.unwrap();
    ws
}

fn frame(kind: &str, data: Value) -> Message {
    Message::Text(json!({ "v": 1, "e": kind, "d": data }).to_string().into())
}

/// Waits for the session to go stale after processing `frames` frames.
async fn wait_until_disconnected(server: &StatsServer, id: &ServerId, frames: u64) {
    for _ in 0..100 {
        let parked = server
            .sessions()
            .session(id)
            .is_some_and(|info| info.stale && info.stats.received == frames);
        if parked {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("session {id} never disconnected");
}

#[tokio::test]
async fn test_websocket_match_round_trip() {
    let (server, db, url) = running_server().await;
    let mut ws = connect(&url, "ws-1").await;
    let (a, b) = (PlayerId::new(), PlayerId::new());

    ws.send(frame("MATCH_LOAD", load(&["Red", "Blue"]))).await.unwrap();
    ws.send(frame("MATCH_START", start(&[(a, "A", Some("Red")), (b, "B", Some("Blue"))])))
        .await
        .unwrap();
    ws.send(frame("PLAYER_DEATH", kill(a, b, "BOW"))).await.unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let command: OutboundCommand = serde_json::from_str(reply.to_text().unwrap()).unwrap();
    assert!(matches!(command, OutboundCommand::PlayerXpGain { player_id, gain: 40, .. } if player_id == a));

    ws.send(frame("MATCH_END", end(&["Red"]))).await.unwrap();
    ws.close(None).await.unwrap();

    let id = ServerId::new("ws-1");
    wait_until_disconnected(&server, &id, 4).await;

    let saved = db.find_matches_by_server(&id).await.unwrap();
    assert_eq!(saved.len(), 1);
    assert!(saved[0].ended_at.is_some());
    let player = server.players().get(&a).await.unwrap().unwrap();
    assert_eq!(player.stats.kills, 1);
    assert_eq!(player.stats.wins, 1);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_reconnect_resumes_parked_match() {
    let (server, db, url) = running_server().await;
    let id = ServerId::new("ws-2");
    let a = PlayerId::new();

    let mut ws = connect(&url, "ws-2").await;
    ws.send(frame("MATCH_LOAD", load(&["Red", "Blue"]))).await.unwrap();
    ws.send(frame("MATCH_START", start(&[(a, "A", Some("Red"))]))).await.unwrap();
    ws.close(None).await.unwrap();
    wait_until_disconnected(&server, &id, 2).await;
    assert_eq!(server.sessions().parked_count(), 1);

    let mut ws = connect(&url, "ws-2").await;
    ws.send(frame("MATCH_END", end(&["Red"]))).await.unwrap();
    ws.close(None).await.unwrap();
    wait_until_disconnected(&server, &id, 1).await;

    let saved = db.find_matches_by_server(&id).await.unwrap();
    assert_eq!(saved.len(), 1);
    assert!(saved[0].ended_at.is_some());
    assert_eq!(server.players().get(&a).await.unwrap().unwrap().stats.wins, 1);
    assert_eq!(server.sessions().parked_count(), 0);

    server.shutdown().await.unwrap();
}
