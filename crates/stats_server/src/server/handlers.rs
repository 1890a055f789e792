//! Per-connection handling: WebSocket handshake, the sequential read loop and
//! the outbound writer task.

use crate::cache::PlayerCache;
use crate::session::{Outbound, ServerSession, SessionConfig, SessionManager, SessionState};
use futures::{SinkExt, StreamExt};
use match_event_system::{Clock, ListenerBus, ServerId};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::accept_hdr_async;
use tracing::{debug, error, info, warn};

/// Handshake header a game server uses to identify itself.
pub const SERVER_ID_HEADER: &str = "x-server-id";

/// Everything a connection task needs, shared by all of them.
#[derive(Debug)]
pub struct ConnectionContext {
    pub players: Arc<PlayerCache>,
    pub bus: Arc<ListenerBus<SessionState>>,
    pub sessions: Arc<SessionManager>,
    pub clock: Arc<dyn Clock>,
    pub session_config: SessionConfig,
    pub stall_timeout: Duration,
    /// `None` disables periodic snapshots
    pub snapshot_interval: Option<Duration>,
    pub outbound_capacity: usize,
}

/// Serves one game server connection until it closes, stalls or the server
/// shuts down.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    ctx: Arc<ConnectionContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut announced_id = None;
    let callback = |request: &Request, response: Response| {
        announced_id = request
            .headers()
            .get(SERVER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ServerId::new);
        Ok(response)
    };

    let ws_stream = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake failed for {}: {}", addr, e);
            return;
        }
    };

    let server_id = announced_id.unwrap_or_else(|| {
        let generated = ServerId::anonymous();
        warn!("⚠️ {} did not send {}, using {}", addr, SERVER_ID_HEADER, generated);
        generated
    });

    let (mut ws_sink, mut ws_receiver) = ws_stream.split();

    let parked = match ctx.sessions.connect(&server_id, ctx.clock.now_millis()) {
        Ok(parked) => parked,
        Err(e) => {
            warn!("⚠️ Rejecting connection from {}: {}", addr, e);
            let _ = ws_sink.send(Message::Close(None)).await;
            return;
        }
    };
    info!("✅ Game server {} connected from {}", server_id, addr);

    let (outbound, mut outbound_rx) = Outbound::channel(ctx.outbound_capacity);
    let writer_id = server_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(command) = outbound_rx.recv().await {
            let text = match command.to_json() {
                Ok(text) => text,
                Err(e) => {
                    error!("❌ Could not encode command for {}: {}", writer_id, e);
                    continue;
                }
            };
            if let Err(e) = ws_sink.send(Message::Text(text.into())).await {
                debug!("Writer for {} stopped: {}", writer_id, e);
                break;
            }
        }
        let _ = ws_sink.close().await;
    });

    let state = SessionState::new(
        server_id.clone(),
        ctx.session_config.clone(),
        Arc::clone(&ctx.players),
        outbound,
        Arc::clone(&ctx.clock),
    );
    let mut session = ServerSession::new(state, Arc::clone(&ctx.bus), ctx.stall_timeout);
    if let Some(parked) = parked {
        session.resume(parked);
    }

    let snapshot_period = ctx.snapshot_interval.unwrap_or(Duration::from_secs(3600));
    let mut snapshot_ticker = tokio::time::interval(snapshot_period);
    snapshot_ticker.tick().await;

    if !*shutdown.borrow() {
        loop {
            tokio::select! {
                frame = ws_receiver.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            ctx.sessions.touch(&server_id, ctx.clock.now_millis());
                            if let Err(e) = session.handle_text(text.as_str()).await {
                                error!("❌ Closing session for {}: {}", server_id, e);
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("Game server {} closed the connection", server_id);
                            break;
                        }
                        Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                        Some(Ok(_)) => {
                            warn!("⚠️ Unsupported frame type from {}", server_id);
                        }
                        Some(Err(e)) => {
                            error!("WebSocket error for {}: {}", server_id, e);
                            break;
                        }
                    }
                }
                _ = snapshot_ticker.tick(), if ctx.snapshot_interval.is_some() => {
                    if session.state().current_match.is_some() || !session.state().unsaved_matches.is_empty() {
                        let saved = session.snapshot().await;
                        debug!("💾 Snapshot for {} saved {} documents", server_id, saved);
                    }
                }
                _ = shutdown.changed() => {
                    info!("Shutdown signal received, closing session for {}", server_id);
                    break;
                }
            }
        }
    }

    session.snapshot().await;
    ctx.sessions.update_stats(&server_id, session.stats());
    ctx.sessions
        .disconnect(&server_id, session.into_parked(), ctx.clock.now_millis());

    // Dropping the session closed the outbound queue; let the writer drain.
    let _ = writer.await;
    info!("Game server {} disconnected", server_id);
}
