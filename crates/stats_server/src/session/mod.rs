//! # Server Sessions
//!
//! One [`ServerSession`] exists per connected game server. It owns that
//! server's live match and feeds decoded events through the listener bus one
//! at a time, so event N+1 never starts before every handler for event N has
//! finished.
//!
//! ## Module Organization
//!
//! - [`state`] - The context handed to listeners
//! - [`outbound`] - Fire-and-forget commands back to the game server
//! - [`manager`] - Registry of connected and stale sessions

pub mod manager;
pub mod outbound;
pub mod state;

pub use manager::{ParkedSession, SessionInfo, SessionManager};
pub use outbound::Outbound;
pub use state::{SessionConfig, SessionState};

use crate::error::ServerError;
use match_event_system::{decode_event, ListenerBus, ServerEvent, ServerId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Counters for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub received: u64,
    pub dispatched: u64,
    /// Frames dropped as protocol errors
    pub rejected: u64,
    pub handler_failures: u64,
    pub invariant_violations: u64,
}

/// Sequential event processor for one game server.
pub struct ServerSession {
    state: SessionState,
    bus: Arc<ListenerBus<SessionState>>,
    stats: SessionStats,
    stall_timeout: Duration,
}

impl ServerSession {
    pub fn new(state: SessionState, bus: Arc<ListenerBus<SessionState>>, stall_timeout: Duration) -> Self {
        Self {
            state,
            bus,
            stats: SessionStats::default(),
            stall_timeout,
        }
    }

    /// Picks up the match state of an earlier connection from the same server.
    pub fn resume(&mut self, parked: ParkedSession) {
        if parked.current_match.is_some() {
            self.state.current_match = parked.current_match;
        }
        self.state.unsaved_matches.extend(parked.unsaved_matches);
    }

    /// Hands the unfinished match state back for parking.
    pub fn into_parked(self) -> ParkedSession {
        ParkedSession {
            current_match: self.state.current_match,
            unsaved_matches: self.state.unsaved_matches,
        }
    }

    pub fn server_id(&self) -> &ServerId {
        &self.state.server_id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Decodes and processes one inbound frame.
    ///
    /// Protocol errors are logged and dropped. Only a stalled dispatch is
    /// returned as an error; the caller must stop reading from this server.
    pub async fn handle_text(&mut self, text: &str) -> Result<(), ServerError> {
        self.stats.received += 1;

        let event = match decode_event(text) {
            Ok(event) => event,
            Err(e) => {
                self.stats.rejected += 1;
                warn!("⚠️ Dropping frame from {}: {}", self.state.server_id, e);
                return Ok(());
            }
        };

        self.handle_event(event).await
    }

    /// Processes one decoded event to completion.
    pub async fn handle_event(&mut self, event: ServerEvent) -> Result<(), ServerError> {
        let kind = event.kind();
        let now = self.state.begin_event();

        // Lifecycle transitions write their own log records.
        if !kind.is_lifecycle() {
            if let Some(live) = self.state.active_match() {
                match event.payload_json() {
                    Ok(data) => live.record(kind, data, now),
                    Err(e) => debug!("Could not log {} payload: {}", kind, e),
                }
            }
        }

        let dispatch = self.bus.dispatch(&mut self.state, &event);
        let result = match tokio::time::timeout(self.stall_timeout, dispatch).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "❌ Handlers for {} from {} stalled for over {:?}, stopping session",
                    kind, self.state.server_id, self.stall_timeout
                );
                return Err(ServerError::Stalled(format!(
                    "{} from {} exceeded {:?}",
                    kind, self.state.server_id, self.stall_timeout
                )));
            }
        };

        self.stats.dispatched += 1;
        match result {
            Ok(report) => {
                self.stats.handler_failures += report.failures.len() as u64;
            }
            Err(e) => {
                self.stats.handler_failures += 1;
                self.stats.invariant_violations += 1;
                error!("❌ Invariant violation on {} from {}: {}", kind, self.state.server_id, e);
            }
        }

        Ok(())
    }

    /// Persists the live match and retries unsaved documents.
    pub async fn snapshot(&mut self) -> usize {
        self.state.snapshot().await
    }
}

impl std::fmt::Debug for ServerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSession")
            .field("server_id", &self.state.server_id)
            .field("stats", &self.stats)
            .field("stall_timeout", &self.stall_timeout)
            .finish()
    }
}
