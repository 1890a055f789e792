//! Fire-and-forget command channel back to a game server.

use match_event_system::OutboundCommand;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Sending half of a session's outbound queue. The connection's writer task
/// owns the receiving half.
#[derive(Debug, Clone)]
pub struct Outbound {
    sender: mpsc::Sender<OutboundCommand>,
}

impl Outbound {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutboundCommand>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Queues a command without waiting. Commands are dropped, with a log
    /// line, when the queue is full or the connection is gone.
    pub fn call(&self, command: OutboundCommand) {
        match self.sender.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(command)) => {
                warn!("⚠️ Outbound queue full, dropping {:?}", command);
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Outbound channel closed, dropping command");
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
