//! # Listener Bus
//!
//! Priority-ordered, cancellable, sequential dispatch of decoded events to
//! typed listeners. The bus is generic over a context type `C` that every
//! handler receives by exclusive reference; in the stats server that context
//! is the per-connection session state.
//!
//! ## Registration
//!
//! Handlers register for one payload type (and therefore one
//! [`EventKind`](crate::EventKind)) and a tier from [`EventPriority`]. Within a
//! tier, registration order is the tie-break.
//!
//! ## Module Organization
//!
//! - [`core`] - The `ListenerBus` struct and registration
//! - [`dispatch`] - Sequential dispatch with cancellation
//! - [`handlers`] - `Listener`, `EventCall` and the type-erasing adapters
//! - [`stats`] - `BusStats` and `DispatchReport`

pub mod core;
pub mod dispatch;
pub mod handlers;
pub mod stats;

pub use self::core::ListenerBus;
pub use handlers::{EventCall, EventHandler, EventPriority, FnListener, Listener, TypedListener};
pub use stats::{BusStats, DispatchReport};
