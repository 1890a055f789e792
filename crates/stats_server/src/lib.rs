//! # Stats Server
//!
//! Backend that game servers stream live match events to. It tracks every
//! match in memory as it happens, credits per-player statistics and XP as
//! events arrive, and persists both the finished match document and the
//! durable player records.
//!
//! ## Architecture Overview
//!
//! * **Server** ([`server`]) - WebSocket accept loop, one task per connected
//!   game server
//! * **Sessions** ([`session`]) - Sequential event processing for one game
//!   server, owning its live match
//! * **Listeners** ([`listeners`]) - The stat handlers registered on the
//!   listener bus from `match_event_system`
//! * **Live matches** ([`live_match`]) - The `LOADED -> STARTED -> ENDED`
//!   state machine and per-match participant accumulators
//! * **Player cache** ([`cache`]) - Shared read-through, write-through cache
//!   of durable player records
//! * **Storage** ([`store`]) - The document store boundary, in memory or as
//!   JSON files
//!
//! ### Message Flow
//!
//! 1. A game server sends `{"v":1,"e":"PLAYER_DEATH","d":{...}}`
//! 2. The session decodes it, dropping malformed or unknown frames
//! 3. The listener bus runs the `Early` handlers, then the `Late` ones
//! 4. Handlers update the live match and write players through the cache
//! 5. XP gains and chat messages go back to the game server as commands
//!
//! ## Configuration
//!
//! Settings come from a TOML file (see [`config::Config`]) with command-line
//! overrides from [`config::Args`].

pub mod cache;
pub mod config;
pub mod error;
pub mod listeners;
pub mod live_match;
pub mod logging;
pub mod models;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod store;
pub mod xp;

pub use cache::{CacheStats, PlayerCache};
pub use error::{CacheError, MatchError, ServerError, StoreError};
pub use live_match::{LiveMatch, MatchState, Participant};
pub use models::{Death, Player, PlayerStats};
pub use server::StatsServer;
pub use session::{ServerSession, SessionManager, SessionState, SessionStats};
pub use store::{Database, JsonFileDatabase, MemoryDatabase};
