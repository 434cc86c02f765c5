//! In-process reference backend for [`SharedStore`].
//!
//! Rows live in `DashMap` tables, which gives the linearizable single-row
//! writes the contract requires. The change feed is a per-room Tokio
//! broadcast channel: delivery is best-effort (a lagging subscriber simply
//! loses events), which deliberately matches the weakest feed the session
//! engine must tolerate.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use futures::{StreamExt, future::BoxFuture};
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use super::error::{StoreError, StoreResult};
use super::models::{
    NewPlayerRow, NewTicketRow, PlayerId, PlayerPatch, PlayerRow, RoomId, RoomPatch, RoomRow,
    TicketId, TicketPatch, TicketRow, TicketStatus,
};
use super::{ChangeEvent, RoomFeed, SharedStore};

/// Buffered events per room feed before a slow subscriber starts losing some.
const FEED_CAPACITY: usize = 64;

/// In-memory [`SharedStore`] used by tests and the demo binary.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Tables>,
}

#[derive(Default)]
struct Tables {
    rooms: DashMap<RoomId, RoomRow>,
    players: DashMap<PlayerId, PlayerRow>,
    tickets: DashMap<TicketId, TicketRow>,
    feeds: DashMap<RoomId, broadcast::Sender<ChangeEvent>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an event to the room's feed, if anyone ever subscribed to it.
    fn publish(&self, room: &RoomId, event: ChangeEvent) {
        if let Some(sender) = self.inner.feeds.get(room) {
            let _ = sender.send(event);
        }
    }
}

impl SharedStore for MemoryStore {
    fn find_room(&self, id: &RoomId) -> BoxFuture<'static, StoreResult<Option<RoomRow>>> {
        let store = self.clone();
        let id = id.clone();
        Box::pin(async move { Ok(store.inner.rooms.get(&id).map(|row| row.clone())) })
    }

    fn insert_room(&self, row: RoomRow) -> BoxFuture<'static, StoreResult<RoomRow>> {
        let store = self.clone();
        Box::pin(async move {
            match store.inner.rooms.entry(row.id.clone()) {
                Entry::Occupied(_) => Err(StoreError::Conflict {
                    table: "rooms",
                    id: row.id.to_string(),
                }),
                Entry::Vacant(slot) => {
                    slot.insert(row.clone());
                    store.publish(&row.id, ChangeEvent::RoomUpdated(row.clone()));
                    Ok(row)
                }
            }
        })
    }

    fn update_room(&self, id: &RoomId, patch: RoomPatch) -> BoxFuture<'static, StoreResult<()>> {
        let store = self.clone();
        let id = id.clone();
        Box::pin(async move {
            let updated = store.inner.rooms.get_mut(&id).map(|mut row| {
                row.apply_patch(&patch);
                row.clone()
            });
            if let Some(row) = updated {
                store.publish(&id, ChangeEvent::RoomUpdated(row));
            }
            Ok(())
        })
    }

    fn find_player(&self, id: PlayerId) -> BoxFuture<'static, StoreResult<Option<PlayerRow>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.players.get(&id).map(|row| row.clone())) })
    }

    fn players_in_room(&self, room: &RoomId) -> BoxFuture<'static, StoreResult<Vec<PlayerRow>>> {
        let store = self.clone();
        let room = room.clone();
        Box::pin(async move {
            Ok(store
                .inner
                .players
                .iter()
                .filter(|entry| entry.room_id == room)
                .map(|entry| entry.clone())
                .collect())
        })
    }

    fn insert_player(&self, row: NewPlayerRow) -> BoxFuture<'static, StoreResult<PlayerRow>> {
        let store = self.clone();
        Box::pin(async move {
            let player = PlayerRow {
                id: Uuid::new_v4(),
                room_id: row.room_id,
                name: row.name,
                vote: None,
                is_spectator: row.is_spectator,
            };
            store.inner.players.insert(player.id, player.clone());
            store.publish(&player.room_id, ChangeEvent::PlayerInserted(player.clone()));
            Ok(player)
        })
    }

    fn update_player(
        &self,
        id: PlayerId,
        patch: PlayerPatch,
    ) -> BoxFuture<'static, StoreResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let updated = store.inner.players.get_mut(&id).map(|mut row| {
                row.apply_patch(&patch);
                row.clone()
            });
            if let Some(row) = updated {
                let room = row.room_id.clone();
                store.publish(&room, ChangeEvent::PlayerUpdated(row));
            }
            Ok(())
        })
    }

    fn update_players_in_room(
        &self,
        room: &RoomId,
        patch: PlayerPatch,
    ) -> BoxFuture<'static, StoreResult<()>> {
        let store = self.clone();
        let room = room.clone();
        Box::pin(async move {
            let mut updated = Vec::new();
            for mut entry in store.inner.players.iter_mut() {
                if entry.room_id == room {
                    entry.apply_patch(&patch);
                    updated.push(entry.clone());
                }
            }
            for row in updated {
                store.publish(&room, ChangeEvent::PlayerUpdated(row));
            }
            Ok(())
        })
    }

    fn delete_player(&self, id: PlayerId) -> BoxFuture<'static, StoreResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            if let Some((_, row)) = store.inner.players.remove(&id) {
                store.publish(&row.room_id, ChangeEvent::PlayerDeleted(id));
            }
            Ok(())
        })
    }

    fn tickets_in_room(&self, room: &RoomId) -> BoxFuture<'static, StoreResult<Vec<TicketRow>>> {
        let store = self.clone();
        let room = room.clone();
        Box::pin(async move {
            let mut tickets: Vec<TicketRow> = store
                .inner
                .tickets
                .iter()
                .filter(|entry| entry.room_id == room)
                .map(|entry| entry.clone())
                .collect();
            tickets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            Ok(tickets)
        })
    }

    fn insert_ticket(&self, row: NewTicketRow) -> BoxFuture<'static, StoreResult<TicketRow>> {
        let store = self.clone();
        Box::pin(async move {
            let ticket = TicketRow {
                id: Uuid::new_v4(),
                room_id: row.room_id,
                title: row.title,
                status: TicketStatus::Pending,
                score: None,
                votes_snapshot: None,
                created_at: OffsetDateTime::now_utc(),
            };
            store.inner.tickets.insert(ticket.id, ticket.clone());
            store.publish(&ticket.room_id, ChangeEvent::TicketInserted(ticket.clone()));
            Ok(ticket)
        })
    }

    fn update_ticket(
        &self,
        id: TicketId,
        patch: TicketPatch,
    ) -> BoxFuture<'static, StoreResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let updated = store.inner.tickets.get_mut(&id).map(|mut row| {
                row.apply_patch(&patch);
                row.clone()
            });
            if let Some(row) = updated {
                let room = row.room_id.clone();
                store.publish(&room, ChangeEvent::TicketUpdated(row));
            }
            Ok(())
        })
    }

    fn delete_ticket(&self, id: TicketId) -> BoxFuture<'static, StoreResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            if let Some((_, row)) = store.inner.tickets.remove(&id) {
                store.publish(&row.room_id, ChangeEvent::TicketDeleted(id));
            }
            Ok(())
        })
    }

    fn subscribe(&self, room: &RoomId) -> BoxFuture<'static, StoreResult<RoomFeed>> {
        let store = self.clone();
        let room = room.clone();
        Box::pin(async move {
            let receiver = store
                .inner
                .feeds
                .entry(room)
                .or_insert_with(|| broadcast::channel(FEED_CAPACITY).0)
                .subscribe();
            // Lagged subscribers lose events; the projection recovers through
            // later notifications, as the contract allows.
            let feed = BroadcastStream::new(receiver)
                .filter_map(|event| async move { event.ok() })
                .boxed();
            Ok(feed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deck() -> Vec<String> {
        vec!["1".into(), "2".into(), "3".into()]
    }

    #[tokio::test]
    async fn room_insert_conflicts_on_existing_token() {
        let store = MemoryStore::new();
        let id = RoomId::new("race-room");
        store
            .insert_room(RoomRow::new(id.clone(), deck()))
            .await
            .unwrap();

        let err = store
            .insert_room(RoomRow::new(id.clone(), deck()))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        // The loser of the race can still read the winner's row.
        assert!(store.find_room(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn feed_delivers_player_lifecycle_events() {
        let store = MemoryStore::new();
        let room = RoomId::new("feed-room");
        store
            .insert_room(RoomRow::new(room.clone(), deck()))
            .await
            .unwrap();
        let mut feed = store.subscribe(&room).await.unwrap();

        let player = store
            .insert_player(NewPlayerRow {
                room_id: room.clone(),
                name: "Ada".into(),
                is_spectator: false,
            })
            .await
            .unwrap();
        store
            .update_player(player.id, PlayerPatch::vote(Some("3".into())))
            .await
            .unwrap();
        store.delete_player(player.id).await.unwrap();

        assert_eq!(
            feed.next().await,
            Some(ChangeEvent::PlayerInserted(player.clone()))
        );
        match feed.next().await {
            Some(ChangeEvent::PlayerUpdated(row)) => assert_eq!(row.vote.as_deref(), Some("3")),
            other => panic!("expected player update, got {other:?}"),
        }
        assert_eq!(feed.next().await, Some(ChangeEvent::PlayerDeleted(player.id)));
    }

    #[tokio::test]
    async fn update_of_missing_row_is_a_noop() {
        let store = MemoryStore::new();
        store
            .update_ticket(Uuid::new_v4(), TicketPatch::default())
            .await
            .unwrap();
        store
            .update_player(Uuid::new_v4(), PlayerPatch::vote(None))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn tickets_are_listed_in_creation_order() {
        let store = MemoryStore::new();
        let room = RoomId::new("agenda-room");
        for title in ["first", "second", "third"] {
            store
                .insert_ticket(NewTicketRow {
                    room_id: room.clone(),
                    title: title.into(),
                })
                .await
                .unwrap();
        }

        let titles: Vec<String> = store
            .tickets_in_room(&room)
            .await
            .unwrap()
            .into_iter()
            .map(|ticket| ticket.title)
            .collect();
        assert_eq!(titles, ["first", "second", "third"]);
    }
}
