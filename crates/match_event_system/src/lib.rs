//! # Match Event System
//!
//! Typed event envelopes and the prioritized listener bus used to process the
//! live event streams that game servers send while a match is running.
//!
//! ## Core Components
//!
//! - **Event envelope**: the closed [`EventKind`] enumeration, the decoded
//!   [`ServerEvent`] and the wire codec ([`decode_event`], [`OutboundCommand`])
//! - **Payloads**: one immutable struct per event kind in [`events`]
//! - **Listener bus**: [`ListenerBus`] routes an event to its handlers in
//!   `EARLY`-then-`LATE` order with cancellation
//!
//! ## Quick Start
//!
//! ```rust
//! use match_event_system::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), EventError> {
//! let mut bus: ListenerBus<u32> = ListenerBus::new();
//! bus.on_fn(EventPriority::Early, "count-streaks", |count: &mut u32, call: &mut EventCall<'_, KillstreakData>| {
//!     *count += call.data().amount;
//!     Ok(())
//! });
//!
//! let event = decode_event(r#"{"e":"KILLSTREAK","d":{"playerId":"550e8400-e29b-41d4-a716-446655440000","amount":5}}"#)?;
//! let mut count = 0;
//! bus.dispatch(&mut count, &event).await?;
//! assert_eq!(count, 5);
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod envelope;
pub mod error;
pub mod events;
pub mod types;
pub mod utils;

pub use bus::{
    BusStats, DispatchReport, EventCall, EventHandler, EventPriority, FnListener, Listener, ListenerBus,
    TypedListener,
};
pub use envelope::{decode_event, encode_event, Event, EventKind, OutboundCommand, ServerEvent, PROTOCOL_VERSION};
pub use error::EventError;
pub use events::*;
pub use types::*;
pub use utils::{current_timestamp_millis, Clock, ManualClock, SystemClock};

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use serde::{Deserialize, Serialize};
