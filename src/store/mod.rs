//! Capability wrapper around the shared store used to coordinate all clients.
//!
//! The store itself is an external collaborator: it must provide linearizable
//! single-row writes and a best-effort, at-least-once (unordered, possibly
//! duplicated) push feed of committed writes. Everything the session engine
//! needs from it is expressed by the [`SharedStore`] trait.

pub mod error;
pub mod memory;
pub mod models;
#[cfg(feature = "rest-store")]
pub mod rest;

use futures::{future::BoxFuture, stream::BoxStream};

use self::error::StoreResult;
use self::models::{
    NewPlayerRow, NewTicketRow, PlayerId, PlayerPatch, PlayerRow, RoomId, RoomPatch, RoomRow,
    TicketId, TicketPatch, TicketRow,
};

/// Row-level change notification delivered to subscribers of a room.
///
/// Delivery is at-least-once and unordered across tables: consumers must
/// apply each event idempotently and in isolation. `Deleted` events carry the
/// row id only, since the row body may already be gone.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// The room row was written (covers both creation and updates).
    RoomUpdated(RoomRow),
    /// A player row appeared in the room.
    PlayerInserted(PlayerRow),
    /// A player row was rewritten.
    PlayerUpdated(PlayerRow),
    /// A player row was removed.
    PlayerDeleted(PlayerId),
    /// A ticket row appeared in the room.
    TicketInserted(TicketRow),
    /// A ticket row was rewritten.
    TicketUpdated(TicketRow),
    /// A ticket row was removed.
    TicketDeleted(TicketId),
}

/// Stream of change notifications scoped to one room.
///
/// Dropping the stream releases the subscription, bounding resource use per
/// observed room rather than per process lifetime.
pub type RoomFeed = BoxStream<'static, ChangeEvent>;

/// Abstraction over the shared store consumed by the session engine.
///
/// Single-row operations are atomic; nothing beyond that is assumed. Updates
/// of rows that no longer exist are silent no-ops, since a concurrent delete
/// is always possible and the projection converges via the feed.
pub trait SharedStore: Send + Sync {
    /// Fetch a room row by its token.
    fn find_room(&self, id: &RoomId) -> BoxFuture<'static, StoreResult<Option<RoomRow>>>;
    /// Insert a room row, failing with a conflict if the token is taken.
    fn insert_room(&self, row: RoomRow) -> BoxFuture<'static, StoreResult<RoomRow>>;
    /// Apply a partial update to a room row.
    fn update_room(&self, id: &RoomId, patch: RoomPatch) -> BoxFuture<'static, StoreResult<()>>;

    /// Fetch a player row by id.
    fn find_player(&self, id: PlayerId) -> BoxFuture<'static, StoreResult<Option<PlayerRow>>>;
    /// List every player row in a room.
    fn players_in_room(&self, room: &RoomId) -> BoxFuture<'static, StoreResult<Vec<PlayerRow>>>;
    /// Insert a player row; the store assigns the id.
    fn insert_player(&self, row: NewPlayerRow) -> BoxFuture<'static, StoreResult<PlayerRow>>;
    /// Apply a partial update to a player row.
    fn update_player(&self, id: PlayerId, patch: PlayerPatch)
    -> BoxFuture<'static, StoreResult<()>>;
    /// Apply a partial update to every player row in a room.
    fn update_players_in_room(
        &self,
        room: &RoomId,
        patch: PlayerPatch,
    ) -> BoxFuture<'static, StoreResult<()>>;
    /// Remove a player row.
    fn delete_player(&self, id: PlayerId) -> BoxFuture<'static, StoreResult<()>>;

    /// List every ticket row in a room, ordered by creation time.
    fn tickets_in_room(&self, room: &RoomId) -> BoxFuture<'static, StoreResult<Vec<TicketRow>>>;
    /// Insert a ticket row in `pending` state; the store assigns id and timestamp.
    fn insert_ticket(&self, row: NewTicketRow) -> BoxFuture<'static, StoreResult<TicketRow>>;
    /// Apply a partial update to a ticket row.
    fn update_ticket(&self, id: TicketId, patch: TicketPatch)
    -> BoxFuture<'static, StoreResult<()>>;
    /// Remove a ticket row.
    fn delete_ticket(&self, id: TicketId) -> BoxFuture<'static, StoreResult<()>>;

    /// Subscribe to the change feed of one room.
    fn subscribe(&self, room: &RoomId) -> BoxFuture<'static, StoreResult<RoomFeed>>;
}
