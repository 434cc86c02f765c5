//! Error taxonomy of the session engine.

use thiserror::Error;
use validator::ValidationErrors;

use crate::store::error::StoreError;
use crate::store::models::RoomId;

/// Fatal failure while joining a room.
///
/// A client without a resolved identity must not interact with the room, so
/// these are surfaced as blocking errors rather than retried silently.
#[derive(Debug, Error)]
pub enum JoinError {
    /// The room row could not be created or fetched.
    #[error("failed to create or read room `{room}`")]
    Room {
        /// Room being joined.
        room: RoomId,
        /// Underlying store failure.
        #[source]
        source: StoreError,
    },
    /// Both the insert and the conflict-fallback read came back empty.
    #[error("room `{room}` could not be created or read")]
    RoomUnresolved {
        /// Room being joined.
        room: RoomId,
    },
    /// The initial bulk read of players and tickets failed.
    #[error("failed to read initial state of room `{room}`")]
    Seed {
        /// Room being joined.
        room: RoomId,
        /// Underlying store failure.
        #[source]
        source: StoreError,
    },
    /// No player row could be resolved or created for this session.
    #[error("failed to resolve a player identity in room `{room}`")]
    Identity {
        /// Room being joined.
        room: RoomId,
        /// Underlying store failure.
        #[source]
        source: StoreError,
    },
    /// The room change feed could not be opened.
    #[error("failed to subscribe to room `{room}`")]
    Subscribe {
        /// Room being joined.
        room: RoomId,
        /// Underlying store failure.
        #[source]
        source: StoreError,
    },
}

/// Failure of a single session action.
///
/// Non-fatal: the session stays usable and the next authoritative
/// notification (or a manual retry) corrects any optimistic local state.
#[derive(Debug, Error)]
pub enum ActionError {
    /// Input rejected before any write was attempted.
    #[error("invalid input: {0}")]
    Validation(String),
    /// The action is not allowed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// The action referenced a row the projection does not know.
    #[error("not found: {0}")]
    NotFound(String),
    /// The store write itself failed.
    #[error("store write failed")]
    Mutation(#[source] StoreError),
}

impl From<StoreError> for ActionError {
    fn from(err: StoreError) -> Self {
        ActionError::Mutation(err)
    }
}

impl From<ValidationErrors> for ActionError {
    fn from(err: ValidationErrors) -> Self {
        ActionError::Validation(format!("validation failed: {err}"))
    }
}
