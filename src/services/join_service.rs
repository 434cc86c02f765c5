//! Joining a room: insert-or-fetch room creation, initial bulk seed, and the
//! idempotent rejoin protocol.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::JoinError;
use crate::session::identity::SessionKeyStore;
use crate::session::reconcile::RoomProjection;
use crate::session::{SessionState, SharedSession};
use crate::store::SharedStore;
use crate::store::models::{NewPlayerRow, PlayerRow, RoomId, RoomRow};

/// Fallback display name when the external session provides none.
pub const ANONYMOUS_NAME: &str = "Anonymous";

/// Join a room, creating it on first access, and resolve this session's
/// player identity.
///
/// The returned handle owns a live feed subscription; the caller observes
/// the room until the handle is dropped or closed. Failures here are fatal
/// to the session: a client without an identity must not vote.
pub async fn join_room(
    store: Arc<dyn SharedStore>,
    keys: &dyn SessionKeyStore,
    room_id: RoomId,
    display_name: &str,
    default_deck: Vec<String>,
) -> Result<SharedSession, JoinError> {
    let room = ensure_room(&store, &room_id, default_deck).await?;

    // Subscribe before the bulk read so writes landing in between are
    // buffered in the feed rather than lost outright.
    let feed = store
        .subscribe(&room_id)
        .await
        .map_err(|source| JoinError::Subscribe {
            room: room_id.clone(),
            source,
        })?;

    let players = store
        .players_in_room(&room_id)
        .await
        .map_err(|source| JoinError::Seed {
            room: room_id.clone(),
            source,
        })?;
    let tickets = store
        .tickets_in_room(&room_id)
        .await
        .map_err(|source| JoinError::Seed {
            room: room_id.clone(),
            source,
        })?;
    let mut projection = RoomProjection::seed(Some(room), players, tickets);

    let player = resolve_player(&store, keys, &room_id, display_name).await?;
    info!(room = %room_id, player = %player.id, name = %player.name, "joined room");
    projection.upsert_player(player.clone());

    let session = SessionState::new(store, room_id, player.id, projection);
    session.attach_feed(feed);
    Ok(session)
}

/// Fetch the room row, creating it when absent.
///
/// Creation is insert-first: when the insert conflicts another client won
/// the race and its row is re-read as the truth. A fetch-then-insert order
/// would leave a window where both clients believe they created the room.
async fn ensure_room(
    store: &Arc<dyn SharedStore>,
    room_id: &RoomId,
    default_deck: Vec<String>,
) -> Result<RoomRow, JoinError> {
    let found = store
        .find_room(room_id)
        .await
        .map_err(|source| JoinError::Room {
            room: room_id.clone(),
            source,
        })?;
    if let Some(existing) = found {
        return Ok(existing);
    }

    match store
        .insert_room(RoomRow::new(room_id.clone(), default_deck))
        .await
    {
        Ok(row) => {
            debug!(room = %room_id, "created room");
            Ok(row)
        }
        Err(err) if err.is_conflict() => store
            .find_room(room_id)
            .await
            .map_err(|source| JoinError::Room {
                room: room_id.clone(),
                source,
            })?
            .ok_or_else(|| JoinError::RoomUnresolved {
                room: room_id.clone(),
            }),
        Err(source) => Err(JoinError::Room {
            room: room_id.clone(),
            source,
        }),
    }
}

/// Resolve which player row this session owns, creating one at most once.
///
/// A stored id whose row still exists is reused as-is; a stored id whose row
/// was deleted server-side is replaced by a fresh row and the key is
/// overwritten, so the dead identity is never resurrected.
async fn resolve_player(
    store: &Arc<dyn SharedStore>,
    keys: &dyn SessionKeyStore,
    room_id: &RoomId,
    display_name: &str,
) -> Result<PlayerRow, JoinError> {
    if let Some(stored) = keys.get(room_id) {
        match store.find_player(stored).await {
            Ok(Some(row)) => {
                debug!(room = %room_id, player = %stored, "rejoined as existing player");
                return Ok(row);
            }
            Ok(None) => {
                debug!(room = %room_id, player = %stored, "stored player row is gone; creating a new one");
            }
            Err(source) => {
                return Err(JoinError::Identity {
                    room: room_id.clone(),
                    source,
                });
            }
        }
    }

    let name = if display_name.trim().is_empty() {
        ANONYMOUS_NAME
    } else {
        display_name
    };
    let row = store
        .insert_player(NewPlayerRow {
            room_id: room_id.clone(),
            name: name.to_owned(),
            is_spectator: false,
        })
        .await
        .map_err(|source| JoinError::Identity {
            room: room_id.clone(),
            source,
        })?;
    keys.set(room_id, row.id);
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::identity::MemorySessionKeys;
    use crate::store::memory::MemoryStore;

    fn deck() -> Vec<String> {
        vec!["1".into(), "2".into(), "3".into()]
    }

    fn arc_store() -> Arc<dyn SharedStore> {
        Arc::new(MemoryStore::new())
    }

    #[tokio::test]
    async fn first_join_creates_room_and_player() {
        let store = arc_store();
        let keys = MemorySessionKeys::new();
        let room = RoomId::new("fresh-room");

        let session = join_room(store.clone(), &keys, room.clone(), "Ada", deck())
            .await
            .expect("join");

        let stored_room = store.find_room(&room).await.unwrap().expect("room row");
        assert_eq!(stored_room.card_deck, deck());
        assert!(!stored_room.is_revealed);

        let players = store.players_in_room(&room).await.unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].id, session.player_id());
        assert_eq!(keys.get(&room), Some(session.player_id()));
    }

    #[tokio::test]
    async fn rejoin_with_live_row_never_creates_a_second_player() {
        let store = arc_store();
        let keys = MemorySessionKeys::new();
        let room = RoomId::new("rejoin-room");

        let first = join_room(store.clone(), &keys, room.clone(), "Ada", deck())
            .await
            .expect("first join");
        let first_id = first.player_id();
        drop(first);

        // Same keys simulate a reload of the same browser session.
        let second = join_room(store.clone(), &keys, room.clone(), "Ada", deck())
            .await
            .expect("second join");

        assert_eq!(second.player_id(), first_id);
        assert_eq!(store.players_in_room(&room).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejoin_after_server_side_delete_creates_exactly_one_new_row() {
        let store = arc_store();
        let keys = MemorySessionKeys::new();
        let room = RoomId::new("deleted-row-room");

        let first = join_room(store.clone(), &keys, room.clone(), "Ada", deck())
            .await
            .expect("first join");
        let stale_id = first.player_id();
        drop(first);

        store.delete_player(stale_id).await.unwrap();

        let second = join_room(store.clone(), &keys, room.clone(), "Ada", deck())
            .await
            .expect("rejoin");

        assert_ne!(second.player_id(), stale_id);
        assert_eq!(keys.get(&room), Some(second.player_id()));
        assert_eq!(store.players_in_room(&room).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn distinct_sessions_get_distinct_players() {
        let store = arc_store();
        let room = RoomId::new("two-browser-room");
        let ada_keys = MemorySessionKeys::new();
        let brin_keys = MemorySessionKeys::new();

        let ada = join_room(store.clone(), &ada_keys, room.clone(), "Ada", deck())
            .await
            .expect("ada joins");
        let brin = join_room(store.clone(), &brin_keys, room.clone(), "Brin", deck())
            .await
            .expect("brin joins");

        assert_ne!(ada.player_id(), brin.player_id());
        assert_eq!(store.players_in_room(&room).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn joining_an_existing_room_keeps_its_deck() {
        let store = arc_store();
        let keys = MemorySessionKeys::new();
        let room = RoomId::new("existing-room");
        store
            .insert_room(RoomRow::new(room.clone(), vec!["XS".into(), "XL".into()]))
            .await
            .unwrap();

        let session = join_room(store.clone(), &keys, room.clone(), "Ada", deck())
            .await
            .expect("join");

        let view = session.view().await;
        assert_eq!(view.deck, vec!["XS".to_string(), "XL".to_string()]);
    }

    #[tokio::test]
    async fn blank_display_name_falls_back_to_anonymous() {
        let store = arc_store();
        let keys = MemorySessionKeys::new();
        let room = RoomId::new("anon-room");

        join_room(store.clone(), &keys, room.clone(), "   ", deck())
            .await
            .expect("join");

        let players = store.players_in_room(&room).await.unwrap();
        assert_eq!(players[0].name, ANONYMOUS_NAME);
    }
}
