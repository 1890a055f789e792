//! # Core Type Definitions
//!
//! Identifiers and small value types shared by every event payload and by the
//! stats server.
//!
//! ## Key Types
//!
//! - [`PlayerId`] - Stable identifier of a player across matches
//! - [`MatchId`] - Opaque identifier generated when a match loads
//! - [`ServerId`] - Name of a connected game server process
//! - [`DamageCause`] - Closed set of death causes reported by game servers
//!
//! ## Design Principles
//!
//! - **Type Safety**: Wrapper types prevent ID confusion (PlayerId vs MatchId)
//! - **Serialization**: All ids serialize as plain strings on the wire

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a player.
///
/// This is a wrapper around UUID that provides type safety and ensures
/// player IDs cannot be confused with other types of IDs in the system.
/// On the wire it is the plain hyphenated UUID string.
///
/// # Examples
///
/// ```rust
/// use match_event_system::PlayerId;
///
/// let player_id = PlayerId::from_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
/// println!("Player ID: {}", player_id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Creates a new random player ID using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a player ID from a string representation.
    ///
    /// Returns `Err(uuid::Error)` with details about the parsing failure when
    /// the input is not a valid UUID.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a live match, generated at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchId(pub Uuid);

impl MatchId {
    /// Creates a new random match ID using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a connected game server process.
///
/// Game servers pick their own names (e.g. `"eu-1"`), so this wraps a string
/// rather than a UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(pub String);

impl ServerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a placeholder id for servers that did not identify themselves.
    pub fn anonymous() -> Self {
        Self(format!("anonymous-{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ServerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Small value types
// ============================================================================

/// Cause of a player death as reported by the game server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DamageCause {
    Melee,
    Projectile,
    Explosion,
    Fire,
    Lava,
    Potion,
    Fall,
    FallVoid,
    Void,
    #[serde(other)]
    Unknown,
}

impl DamageCause {
    /// Whether the death counts towards void kill/death counters.
    pub fn is_void(&self) -> bool {
        matches!(self, DamageCause::Void)
    }
}

/// Lightweight reference to a player, embedded in match records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimplePlayer {
    pub id: PlayerId,
    pub name: String,
}
