//! # Event Envelope & Registry
//!
//! The closed set of event kinds, the decoded [`ServerEvent`] envelope, and the
//! wire codec for both directions of the game-server channel.
//!
//! ## Wire format
//!
//! Inbound frames are JSON text:
//!
//! ```json
//! { "e": "PARTY_JOIN", "d": { "playerId": "...", "playerName": "Steve", "partyName": "Red" }, "v": 1 }
//! ```
//!
//! `v` is optional and defaults to the current [`PROTOCOL_VERSION`]. Outbound
//! commands use the same `{e, d}` shape.

use crate::error::EventError;
use crate::events::*;
use crate::types::PlayerId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol revision understood by this build.
pub const PROTOCOL_VERSION: u32 = 1;

/// Core trait that binds a payload type to exactly one [`EventKind`].
///
/// This is what lets handlers be registered against a concrete payload type
/// while the bus itself routes on the kind tag, without any runtime
/// reflection.
pub trait Event: Serialize + DeserializeOwned + Send + Sync + std::fmt::Debug + 'static {
    /// The kind tag this payload travels under.
    const KIND: EventKind;

    /// Borrows the payload out of an envelope of the matching kind.
    fn from_server_event(event: &ServerEvent) -> Option<&Self>;

    /// Wraps the payload into its envelope.
    fn into_server_event(self) -> ServerEvent;
}

macro_rules! server_events {
    ($($variant:ident => $tag:literal : $payload:ty),* $(,)?) => {
        /// Closed enumeration of inbound event kinds.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum EventKind {
            $($variant),*
        }

        impl EventKind {
            /// Every kind, in declaration order.
            pub const ALL: &'static [EventKind] = &[$(EventKind::$variant),*];

            /// The wire tag for this kind.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(EventKind::$variant => $tag),*
                }
            }

            /// Resolves a wire tag, returning `None` for anything outside the enumeration.
            pub fn from_tag(tag: &str) -> Option<Self> {
                match tag {
                    $($tag => Some(EventKind::$variant),)*
                    _ => None,
                }
            }
        }

        /// A decoded inbound event: kind tag plus its immutable payload.
        #[derive(Debug, Clone)]
        pub enum ServerEvent {
            $($variant($payload)),*
        }

        impl ServerEvent {
            pub fn kind(&self) -> EventKind {
                match self {
                    $(ServerEvent::$variant(_) => EventKind::$variant),*
                }
            }

            /// Decodes a payload for an already-resolved kind.
            pub fn from_payload(kind: EventKind, payload: Value) -> Result<Self, EventError> {
                match kind {
                    $(EventKind::$variant => serde_json::from_value::<$payload>(payload)
                        .map(ServerEvent::$variant)
                        .map_err(EventError::Deserialization)),*
                }
            }

            /// The payload as JSON, used for the match audit log.
            pub fn payload_json(&self) -> Result<Value, EventError> {
                match self {
                    $(ServerEvent::$variant(payload) => serde_json::to_value(payload).map_err(EventError::Serialization)),*
                }
            }
        }

        $(
            impl Event for $payload {
                const KIND: EventKind = EventKind::$variant;

                fn from_server_event(event: &ServerEvent) -> Option<&Self> {
                    match event {
                        ServerEvent::$variant(payload) => Some(payload),
                        _ => None,
                    }
                }

                fn into_server_event(self) -> ServerEvent {
                    ServerEvent::$variant(self)
                }
            }
        )*
    };
}

server_events! {
    MatchLoad => "MATCH_LOAD": MatchLoadData,
    MatchStart => "MATCH_START": MatchStartData,
    MatchEnd => "MATCH_END": MatchEndData,
    PartyJoin => "PARTY_JOIN": PartyJoinData,
    PartyLeave => "PARTY_LEAVE": PartyLeaveData,
    PlayerDeath => "PLAYER_DEATH": PlayerDeathData,
    Killstreak => "KILLSTREAK": KillstreakData,
    CoreLeak => "CORE_LEAK": CoreLeakData,
    ControlPointCapture => "CONTROL_POINT_CAPTURE": ControlPointCaptureData,
    DestroyableDestroy => "DESTROYABLE_DESTROY": DestroyableDestroyData,
    FlagPlace => "FLAG_PLACE": FlagPlaceData,
    FlagPickup => "FLAG_PICKUP": FlagPickupData,
    FlagDrop => "FLAG_DROP": FlagDropData,
    FlagDefend => "FLAG_DEFEND": FlagDefendData,
    WoolPlace => "WOOL_PLACE": WoolPlaceData,
    WoolPickup => "WOOL_PICKUP": WoolPickupData,
    WoolDrop => "WOOL_DROP": WoolDropData,
    WoolDefend => "WOOL_DEFEND": WoolDefendData,
}

impl EventKind {
    /// Lifecycle kinds mutate match state through the state machine and
    /// write their own audit records.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            EventKind::MatchLoad
                | EventKind::MatchStart
                | EventKind::MatchEnd
                | EventKind::PartyJoin
                | EventKind::PartyLeave
        )
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Inbound codec
// ============================================================================

#[derive(Debug, Deserialize)]
struct InboundFrame {
    e: String,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    v: Option<u32>,
}

/// Decodes one inbound text frame into a typed envelope.
///
/// # Errors
///
/// * [`EventError::MalformedFrame`] - not a JSON `{e, d}` object
/// * [`EventError::UnsupportedVersion`] - `v` is newer than [`PROTOCOL_VERSION`]
/// * [`EventError::UnknownEvent`] - `e` is outside the closed enumeration
/// * [`EventError::Deserialization`] - `d` does not match the kind's payload shape
pub fn decode_event(text: &str) -> Result<ServerEvent, EventError> {
    let frame: InboundFrame = serde_json::from_str(text).map_err(EventError::MalformedFrame)?;

    if let Some(version) = frame.v {
        if version > PROTOCOL_VERSION {
            return Err(EventError::UnsupportedVersion(version));
        }
    }

    let kind = EventKind::from_tag(&frame.e).ok_or(EventError::UnknownEvent(frame.e))?;
    ServerEvent::from_payload(kind, frame.d)
}

/// Encodes an envelope back into wire form. Used by tests and replay tooling.
pub fn encode_event(event: &ServerEvent) -> Result<String, EventError> {
    let frame = serde_json::json!({
        "e": event.kind().as_str(),
        "d": event.payload_json()?,
        "v": PROTOCOL_VERSION,
    });
    Ok(frame.to_string())
}

// ============================================================================
// Outbound commands
// ============================================================================

/// Fire-and-forget command pushed back to a game server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "e", content = "d", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundCommand {
    /// Deliver a chat message to the listed players (all players if empty).
    #[serde(rename_all = "camelCase")]
    Message {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sound: Option<String>,
        player_ids: Vec<PlayerId>,
    },
    /// Notify the game server that a player gained XP.
    #[serde(rename = "PLAYER_XP_GAIN", rename_all = "camelCase")]
    PlayerXpGain {
        player_id: PlayerId,
        gain: u32,
        reason: String,
        notify: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        multiplier: Option<f32>,
    },
}

impl OutboundCommand {
    pub fn to_json(&self) -> Result<String, EventError> {
        serde_json::to_string(self).map_err(EventError::Serialization)
    }
}
