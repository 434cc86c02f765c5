//! Client-local reconciliation of change notifications into a projection.
//!
//! The feed makes no promises beyond at-least-once delivery: events may be
//! duplicated, lost, or reordered across tables. Every apply rule here is
//! therefore idempotent and safe in isolation, so any interleaving converges
//! to the same projection as soon as the latest notification per row arrives.

use indexmap::IndexMap;

use crate::store::ChangeEvent;
use crate::store::models::{PlayerId, PlayerRow, RoomRow, TicketId, TicketRow};

/// One client's in-memory view of a room's rows.
///
/// Seeded from an initial bulk read at join time, then maintained
/// exclusively through [`RoomProjection::apply`]. Tickets are kept in
/// creation order regardless of notification arrival order.
#[derive(Debug, Clone, Default)]
pub struct RoomProjection {
    room: Option<RoomRow>,
    players: IndexMap<PlayerId, PlayerRow>,
    tickets: IndexMap<TicketId, TicketRow>,
}

impl RoomProjection {
    /// Build a projection from an initial bulk read.
    pub fn seed(room: Option<RoomRow>, players: Vec<PlayerRow>, tickets: Vec<TicketRow>) -> Self {
        let mut projection = Self {
            room,
            players: players.into_iter().map(|p| (p.id, p)).collect(),
            tickets: tickets.into_iter().map(|t| (t.id, t)).collect(),
        };
        projection.sort_tickets();
        projection
    }

    /// The room row, once known.
    pub fn room(&self) -> Option<&RoomRow> {
        self.room.as_ref()
    }

    /// Iterate the live players in the room.
    pub fn players(&self) -> impl Iterator<Item = &PlayerRow> {
        self.players.values()
    }

    /// Iterate the agenda tickets in creation order.
    pub fn tickets(&self) -> impl Iterator<Item = &TicketRow> {
        self.tickets.values()
    }

    /// Look up a player by id.
    pub fn player(&self, id: PlayerId) -> Option<&PlayerRow> {
        self.players.get(&id)
    }

    /// Look up a ticket by id.
    pub fn ticket(&self, id: TicketId) -> Option<&TicketRow> {
        self.tickets.get(&id)
    }

    /// Merge a player row obtained outside the feed (rejoin, optimistic
    /// insert). Same semantics as a `PlayerUpdated` notification.
    pub fn upsert_player(&mut self, row: PlayerRow) {
        self.players.insert(row.id, row);
    }

    /// Apply one change notification. Returns whether anything changed.
    ///
    /// Rules: inserts are idempotent (a duplicate or an arrival after an
    /// optimistic local insert is skipped); updates replace the row by id,
    /// last notification wins, and an update for an unknown row is treated
    /// as an insert (covers a lost insert notification); deletes are no-ops
    /// when the row is already gone.
    pub fn apply(&mut self, event: ChangeEvent) -> bool {
        match event {
            ChangeEvent::RoomUpdated(row) => {
                if self.room.as_ref() == Some(&row) {
                    return false;
                }
                self.room = Some(row);
                true
            }
            ChangeEvent::PlayerInserted(row) => {
                if self.players.contains_key(&row.id) {
                    return false;
                }
                self.players.insert(row.id, row);
                true
            }
            ChangeEvent::PlayerUpdated(row) => {
                let previous = self.players.insert(row.id, row.clone());
                previous.as_ref() != Some(&row)
            }
            ChangeEvent::PlayerDeleted(id) => self.players.shift_remove(&id).is_some(),
            ChangeEvent::TicketInserted(row) => {
                if self.tickets.contains_key(&row.id) {
                    return false;
                }
                self.tickets.insert(row.id, row);
                self.sort_tickets();
                true
            }
            ChangeEvent::TicketUpdated(row) => {
                let previous = self.tickets.insert(row.id, row.clone());
                let changed = previous.as_ref() != Some(&row);
                if previous.is_none() {
                    self.sort_tickets();
                }
                changed
            }
            ChangeEvent::TicketDeleted(id) => self.tickets.shift_remove(&id).is_some(),
        }
    }

    fn sort_tickets(&mut self) {
        self.tickets
            .sort_by(|_, a, _, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    }
}
