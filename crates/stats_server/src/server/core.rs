//! Core stats server implementation
//!
//! Contains the `StatsServer` struct: the accept loop that gives every game
//! server connection its own task, and the shutdown sequence that makes sure
//! nothing accepted is left unpersisted.

use super::handlers::{handle_connection, ConnectionContext};
use crate::cache::PlayerCache;
use crate::config::Config;
use crate::error::ServerError;
use crate::listeners::build_bus;
use crate::session::{SessionConfig, SessionManager};
use match_event_system::{Clock, SystemClock};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// How long shutdown waits for connection tasks to park their sessions.
const SESSION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// The stats server.
///
/// Owns the shared pieces every session uses: the player cache, the
/// listener bus and the session registry.
#[derive(Debug)]
pub struct StatsServer {
    listen_addr: String,
    context: Arc<ConnectionContext>,
    shutdown_signal: watch::Sender<bool>,
}

impl StatsServer {
    /// Creates a server from its configuration and an already opened cache.
    pub fn new(config: &Config, players: Arc<PlayerCache>) -> Self {
        Self::with_clock(config, players, Arc::new(SystemClock))
    }

    /// Like [`new`](Self::new) with an explicit time source.
    pub fn with_clock(config: &Config, players: Arc<PlayerCache>, clock: Arc<dyn Clock>) -> Self {
        let server = &config.server;
        let snapshot_interval = match server.match_snapshot_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let context = ConnectionContext {
            players,
            bus: Arc::new(build_bus()),
            sessions: Arc::new(SessionManager::with_retention(
                server.stale_session_retention_secs.saturating_mul(1_000),
            )),
            clock,
            session_config: SessionConfig::from_settings(&config.xp),
            stall_timeout: Duration::from_millis(server.handler_stall_timeout_ms.max(1)),
            snapshot_interval,
            outbound_capacity: server.outbound_queue_capacity.max(1),
        };
        let (shutdown_signal, _) = watch::channel(false);

        Self {
            listen_addr: server.listen_addr.clone(),
            context: Arc::new(context),
            shutdown_signal,
        }
    }

    /// Binds the configured listen address.
    ///
    /// # Errors
    /// Returns `ServerError::Network` if the address is invalid or binding fails
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr: SocketAddr = self
            .listen_addr
            .parse()
            .map_err(|e| ServerError::Network(format!("Invalid listen address {}: {}", self.listen_addr, e)))?;

        TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Network(format!("Failed to bind to {}: {}", addr, e)))
    }

    /// Binds and serves until [`shutdown`](Self::shutdown) is called.
    pub async fn start(&self) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accepts game server connections on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let local = listener
            .local_addr()
            .map_err(|e| ServerError::Network(format!("Listener has no local address: {}", e)))?;
        let bus_stats = self.context.bus.get_stats().await;
        info!("🚀 Stats server listening on {}", local);
        info!("Listener bus: {} handlers registered", bus_stats.total_handlers);

        let mut shutdown_rx = self.shutdown_signal.subscribe();
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            info!("New connection from: {}", addr);
                            let context = Arc::clone(&self.context);
                            let shutdown = self.shutdown_signal.subscribe();
                            tokio::spawn(handle_connection(stream, addr, context, shutdown));
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    info!("Shutdown signal received, stopping accept loop");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Stops accepting, waits for sessions to park, then persists everything
    /// still held in memory.
    ///
    /// # Errors
    /// Returns `ServerError::Internal` when player records or match documents
    /// could not be saved; those failures are also logged.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        info!("Shutting down stats server...");
        let _ = self.shutdown_signal.send(true);

        let sessions = &self.context.sessions;
        let drained = tokio::time::timeout(SESSION_DRAIN_TIMEOUT, async {
            while sessions.live_count() > 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        if drained.is_err() {
            warn!("⚠️ {} sessions still open after {:?}", sessions.live_count(), SESSION_DRAIN_TIMEOUT);
        }

        let mut unsaved_matches = 0;
        let store = self.context.players.store();
        for document in sessions.parked_matches() {
            if let Err(e) = store.save_match(&document).await {
                error!("❌ Failed to save match {} at shutdown: {}", document.id, e);
                unsaved_matches += 1;
            }
        }

        let unsaved_players = self.context.players.flush_dirty().await;
        if unsaved_players > 0 {
            error!("❌ {} player records could not be saved at shutdown", unsaved_players);
        }

        if unsaved_matches + unsaved_players > 0 {
            return Err(ServerError::Internal(format!(
                "{} matches and {} players unsaved at shutdown",
                unsaved_matches, unsaved_players
            )));
        }

        info!("Stats server shutdown complete");
        Ok(())
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.context.sessions
    }

    pub fn players(&self) -> &Arc<PlayerCache> {
        &self.context.players
    }

    pub fn listen_addr(&self) -> &str {
        &self.listen_addr
    }
}
