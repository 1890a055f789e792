//! Listener traits and the type-erasing adapters the bus stores.

use crate::envelope::{Event, EventKind, ServerEvent};
use crate::error::EventError;
use async_trait::async_trait;
use std::marker::PhantomData;

/// Handler-tier ordering. All `Early` handlers for a kind run before any
/// `Late` handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventPriority {
    Early,
    Late,
}

/// The view a listener gets of one in-flight event: the immutable payload
/// plus the shared cancellation flag.
#[derive(Debug)]
pub struct EventCall<'a, E> {
    payload: &'a E,
    cancelled: bool,
}

impl<'a, E> EventCall<'a, E> {
    pub fn new(payload: &'a E) -> Self {
        Self {
            payload,
            cancelled: false,
        }
    }

    pub fn data(&self) -> &'a E {
        self.payload
    }

    /// Stops every handler registered after the current one from running.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

/// A handler for one payload type, given exclusive access to the session
/// context `C` for the duration of the call.
///
/// # Examples
///
/// ```rust,ignore
/// struct CountDeaths;
///
/// #[async_trait]
/// impl Listener<Session, PlayerDeathData> for CountDeaths {
///     async fn handle(&self, ctx: &mut Session, call: &mut EventCall<'_, PlayerDeathData>) -> Result<(), EventError> {
///         ctx.deaths += 1;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Listener<C, E>: Send + Sync
where
    C: Send,
    E: Event,
{
    async fn handle(&self, ctx: &mut C, call: &mut EventCall<'_, E>) -> Result<(), EventError>;
}

/// Type-erased handler as stored by the bus.
///
/// Most users will not implement this trait directly; [`ListenerBus::on`]
/// wraps any [`Listener`] in a [`TypedListener`].
///
/// [`ListenerBus::on`]: super::ListenerBus::on
#[async_trait]
pub trait EventHandler<C: Send>: Send + Sync {
    /// Handles a decoded envelope, reading and updating the cancellation flag.
    async fn handle(
        &self,
        ctx: &mut C,
        event: &ServerEvent,
        cancelled: &mut bool,
    ) -> Result<(), EventError>;

    /// The kind this handler expects.
    fn kind(&self) -> EventKind;

    /// Returns a human-readable name for this handler for debugging.
    fn handler_name(&self) -> &str;
}

/// Bridges a typed [`Listener`] to the [`EventHandler`] the bus stores.
pub struct TypedListener<E, L> {
    listener: L,
    name: String,
    _phantom: PhantomData<fn() -> E>,
}

impl<E, L> TypedListener<E, L> {
    pub fn new(name: impl Into<String>, listener: L) -> Self {
        Self {
            listener,
            name: name.into(),
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<C, E, L> EventHandler<C> for TypedListener<E, L>
where
    C: Send,
    E: Event,
    L: Listener<C, E>,
{
    async fn handle(
        &self,
        ctx: &mut C,
        event: &ServerEvent,
        cancelled: &mut bool,
    ) -> Result<(), EventError> {
        let payload = E::from_server_event(event).ok_or_else(|| {
            EventError::HandlerExecution(format!(
                "handler {} expects {} but received {}",
                self.name,
                E::KIND,
                event.kind()
            ))
        })?;

        let mut call = EventCall {
            payload,
            cancelled: *cancelled,
        };
        let result = self.listener.handle(ctx, &mut call).await;
        *cancelled = call.cancelled;
        result
    }

    fn kind(&self) -> EventKind {
        E::KIND
    }

    fn handler_name(&self) -> &str {
        &self.name
    }
}

/// Adapter that lets a plain closure act as a [`Listener`].
///
/// ```rust,ignore
/// bus.on(EventPriority::Early, "count", FnListener::new(|ctx: &mut Vec<u32>, call: &mut EventCall<'_, KillstreakData>| {
///     ctx.push(call.data().amount);
///     Ok(())
/// }));
/// ```
pub struct FnListener<F> {
    handler: F,
}

impl<F> FnListener<F> {
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<C, E, F> Listener<C, E> for FnListener<F>
where
    C: Send,
    E: Event,
    F: Fn(&mut C, &mut EventCall<'_, E>) -> Result<(), EventError> + Send + Sync,
{
    async fn handle(&self, ctx: &mut C, call: &mut EventCall<'_, E>) -> Result<(), EventError> {
        (self.handler)(ctx, call)
    }
}
