//! Dispatch statistics and per-event reports.

use crate::envelope::EventKind;

/// Statistics about the listener bus state and performance.
#[derive(Debug, Clone, Default)]
pub struct BusStats {
    /// Total number of registered handlers
    pub total_handlers: usize,
    /// Total number of events dispatched since the bus was built
    pub events_dispatched: u64,
    /// Events whose handler chain was stopped by a cancellation
    pub events_cancelled: u64,
    /// Handler invocations that returned an error
    pub handler_failures: u64,
    /// Events that arrived with no handler registered for their kind
    pub events_unhandled: u64,
}

/// Outcome of dispatching a single event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub kind: EventKind,
    /// Number of handlers actually invoked, including the one that cancelled
    pub invoked: usize,
    pub cancelled: bool,
    /// Non-fatal handler failures, as `(handler name, message)`
    pub failures: Vec<(String, String)>,
}

impl DispatchReport {
    pub(crate) fn new(kind: EventKind) -> Self {
        Self {
            kind,
            invoked: 0,
            cancelled: false,
            failures: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
