//! Error types for the stats server

use match_event_system::{EventError, MatchId, PlayerId};
use std::{io::Error as IoError, path::PathBuf};
use thiserror::Error;

/// Durable store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to create directory {0}: {1}")]
    DirectoryCreate(PathBuf, IoError),

    #[error("Failed to read directory {0}: {1}")]
    DirectoryRead(PathBuf, IoError),

    #[error("Failed to read file {0}: {1}")]
    FileRead(PathBuf, IoError),

    #[error("Failed to create file {0}: {1}")]
    FileCreate(PathBuf, IoError),

    #[error("Failed to write to file {0}: {1}")]
    FileWrite(PathBuf, IoError),

    #[error("Failed to sync file {0}: {1}")]
    FileSync(PathBuf, IoError),

    #[error("Failed to rename file from {0} to {1}: {2}")]
    FileRename(PathBuf, PathBuf, IoError),

    #[error("Failed to delete file {0}: {1}")]
    FileDelete(PathBuf, IoError),

    #[error("Failed to serialize document {0}: {1}")]
    Serialization(String, serde_json::Error),

    #[error("Failed to deserialize file {0}: {1}")]
    Deserialization(PathBuf, serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Player stat cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Player {0} not found")]
    PlayerNotFound(PlayerId),

    #[error("Failed to load player {0}: {1}")]
    Load(String, #[source] StoreError),

    /// The mutation is applied in memory and the entry stays dirty for the flusher
    #[error("Failed to persist player {id} after {attempts} attempts: {source}")]
    WriteBack {
        id: PlayerId,
        attempts: u32,
        #[source]
        source: StoreError,
    },
}

/// Live match state machine errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("No match is loaded on this server")]
    NoCurrentMatch,

    #[error("Match {0} is still in progress")]
    MatchInProgress(MatchId),

    #[error("Match {0} has already started")]
    AlreadyStarted(MatchId),

    #[error("Match {0} has not started")]
    NotStarted(MatchId),

    #[error("Match {0} has already ended")]
    AlreadyEnded(MatchId),

    #[error("Party {0} does not exist in this match")]
    UnknownParty(String),

    #[error("Player {0} is not in a party")]
    NotInParty(PlayerId),
}

impl MatchError {
    /// Redelivered or premature lifecycle events that are safe to ignore.
    pub fn is_benign(&self) -> bool {
        matches!(self, MatchError::NotStarted(_) | MatchError::AlreadyEnded(_))
    }

    /// State corruption that must be surfaced to operators.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MatchError::NoCurrentMatch | MatchError::MatchInProgress(_) | MatchError::AlreadyStarted(_)
        )
    }
}

impl From<MatchError> for EventError {
    fn from(err: MatchError) -> Self {
        if err.is_fatal() {
            EventError::Invariant(err.to_string())
        } else {
            EventError::HandlerExecution(err.to_string())
        }
    }
}

impl From<CacheError> for EventError {
    fn from(err: CacheError) -> Self {
        EventError::Persistence(err.to_string())
    }
}

impl From<StoreError> for EventError {
    fn from(err: StoreError) -> Self {
        EventError::Persistence(err.to_string())
    }
}

/// Server and transport errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Handshake error: {0}")]
    Handshake(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Session stalled: {0}")]
    Stalled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_match_errors_become_invariants() {
        let id = MatchId::new();
        let err: EventError = MatchError::AlreadyStarted(id).into();
        assert!(err.is_fatal());

        let err: EventError = MatchError::UnknownParty("Green".into()).into();
        assert!(!err.is_fatal());
        assert!(MatchError::AlreadyEnded(id).is_benign());
        assert!(!MatchError::AlreadyEnded(id).is_fatal());
    }
}
