//! Server module containing the WebSocket front end
//!
//! Game servers connect over WebSocket, identify themselves with the
//! `X-Server-Id` handshake header and then stream match events. Each
//! connection is served by its own task.

pub mod core;
pub mod handlers;

pub use self::core::StatsServer;
pub use handlers::{ConnectionContext, SERVER_ID_HEADER};
