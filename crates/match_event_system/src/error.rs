//! Error types for decoding and dispatching events.

/// Errors that can occur during event system operations.
///
/// This enum covers every failure from wire decoding through handler
/// execution. The taxonomy matters to callers: protocol errors are dropped
/// with a log line, fatal errors abort the dispatch of the current event.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// Serialization failed when converting an event to JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The payload did not match the shape required by its kind
    #[error("Deserialization error: {0}")]
    Deserialization(serde_json::Error),
    /// The inbound frame was not a `{e, d}` envelope at all
    #[error("Malformed frame: {0}")]
    MalformedFrame(serde_json::Error),
    /// The kind tag is not part of the closed event enumeration
    #[error("Unknown event kind: {0}")]
    UnknownEvent(String),
    /// The sender speaks a newer protocol revision than this build
    #[error("Unsupported protocol version {0}")]
    UnsupportedVersion(u32),
    /// Handler execution failed during event processing
    #[error("Handler execution error: {0}")]
    HandlerExecution(String),
    /// A durable write could not be completed
    #[error("Persistence error: {0}")]
    Persistence(String),
    /// The event would corrupt match state; dispatch stops
    #[error("Invariant violation: {0}")]
    Invariant(String),
}

impl EventError {
    /// Fatal errors stop the remaining handlers for the event and are
    /// surfaced to the session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EventError::Invariant(_))
    }

    /// A durable write or read failed; the handler's effect may be lost.
    pub fn is_persistence(&self) -> bool {
        matches!(self, EventError::Persistence(_))
    }

    /// Protocol errors come from malformed or unrecognized inbound messages.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            EventError::Deserialization(_)
                | EventError::MalformedFrame(_)
                | EventError::UnknownEvent(_)
                | EventError::UnsupportedVersion(_)
        )
    }
}
