//! Core ListenerBus implementation
use super::handlers::{EventCall, EventHandler, EventPriority, FnListener, Listener, TypedListener};
use super::stats::BusStats;
use crate::envelope::{Event, EventKind};
use crate::error::EventError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

pub(super) struct RegisteredHandler<C> {
    pub(super) priority: EventPriority,
    pub(super) seq: u64,
    pub(super) handler: Arc<dyn EventHandler<C>>,
}

/// Routes decoded events to the handlers registered for their kind.
///
/// The bus is built once (all `on` calls happen up front) and is then shared
/// immutably; dispatch takes the session context by exclusive reference, so a
/// single session can never run two dispatches at once.
///
/// # Ordering
///
/// Handlers for a kind run strictly sequentially, sorted by
/// `(priority, registration sequence)`. A later handler observes every
/// mutation an earlier handler made to the context.
pub struct ListenerBus<C> {
    pub(super) handlers: HashMap<EventKind, Vec<RegisteredHandler<C>>>,
    next_seq: u64,
    pub(super) stats: RwLock<BusStats>,
}

impl<C> std::fmt::Debug for ListenerBus<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerBus")
            .field("kinds", &self.handlers.len())
            .field("handlers", &self.next_seq)
            .finish()
    }
}

impl<C: Send + 'static> ListenerBus<C> {
    /// Creates a bus with no registered handlers.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            next_seq: 0,
            stats: RwLock::new(BusStats::default()),
        }
    }

    /// Registers a listener for the payload type `E` at the given priority tier.
    pub fn on<E, L>(&mut self, priority: EventPriority, name: &str, listener: L) -> &mut Self
    where
        E: Event,
        L: Listener<C, E> + 'static,
    {
        let handler: Arc<dyn EventHandler<C>> = Arc::new(TypedListener::<E, L>::new(name, listener));
        self.register(priority, handler)
    }

    /// Registers a synchronous closure as a listener.
    pub fn on_fn<E, F>(&mut self, priority: EventPriority, name: &str, handler: F) -> &mut Self
    where
        E: Event,
        F: Fn(&mut C, &mut EventCall<'_, E>) -> Result<(), EventError> + Send + Sync + 'static,
    {
        self.on::<E, _>(priority, name, FnListener::new(handler))
    }

    /// Inserts an already type-erased handler.
    pub fn register(&mut self, priority: EventPriority, handler: Arc<dyn EventHandler<C>>) -> &mut Self {
        let kind = handler.kind();
        let seq = self.next_seq;
        self.next_seq += 1;

        debug!("📝 Registered {} handler '{}' ({:?})", kind, handler.handler_name(), priority);

        let entries = self.handlers.entry(kind).or_default();
        entries.push(RegisteredHandler {
            priority,
            seq,
            handler,
        });
        // sort_by_key is stable; seq breaks ties within a tier anyway
        entries.sort_by_key(|entry| (entry.priority, entry.seq));

        self.stats.get_mut().total_handlers += 1;
        self
    }

    /// Number of handlers registered for a kind.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Handler names for a kind, in invocation order.
    pub fn handler_names(&self, kind: EventKind) -> Vec<String> {
        self.handlers
            .get(&kind)
            .map(|entries| {
                entries
                    .iter()
                    .map(|entry| entry.handler.handler_name().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot of the dispatch statistics.
    pub async fn get_stats(&self) -> BusStats {
        self.stats.read().await.clone()
    }
}

impl<C: Send + 'static> Default for ListenerBus<C> {
    fn default() -> Self {
        Self::new()
    }
}
