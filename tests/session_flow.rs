//! Two clients estimating a ticket end to end through a shared in-memory store.

use std::sync::Arc;
use std::time::Duration;

use sprint_planio::config::AppConfig;
use sprint_planio::services::{join_service, session_service};
use sprint_planio::session::SharedSession;
use sprint_planio::session::identity::MemorySessionKeys;
use sprint_planio::store::SharedStore;
use sprint_planio::store::memory::MemoryStore;
use sprint_planio::store::models::{RoomId, TicketStatus};

async fn join(store: &Arc<dyn SharedStore>, room: &RoomId, name: &str) -> SharedSession {
    let keys = MemorySessionKeys::new();
    join_service::join_room(
        store.clone(),
        &keys,
        room.clone(),
        name,
        AppConfig::default().default_deck(),
    )
    .await
    .expect("join")
}

#[tokio::test]
async fn two_clients_estimate_a_ticket_end_to_end() {
    let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
    let room = RoomId::new("planning-e2e");

    let ada = join(&store, &room, "Ada").await;
    let brin = join(&store, &room, "Brin").await;
    assert_ne!(ada.player_id(), brin.player_id());

    // The first join created the room with the built-in deck.
    let view = ada.view().await;
    assert!(view.deck.contains(&"5".to_string()));
    assert!(view.deck.contains(&"☕".to_string()));

    let ticket = session_service::add_ticket(&ada, "Checkout flow")
        .await
        .expect("add ticket");
    session_service::set_active_ticket(&ada, ticket.id)
        .await
        .expect("activate");
    ada.resync().await.expect("resync");
    brin.resync().await.expect("resync");

    session_service::cast_vote(&ada, "5").await.expect("ada votes");
    session_service::cast_vote(&brin, "5").await.expect("brin votes");

    session_service::reveal_votes(&ada).await.expect("reveal");
    ada.resync().await.expect("resync");
    brin.resync().await.expect("resync");

    // Both clients converge on the same revealed view.
    let ada_view = ada.view().await;
    let brin_view = brin.view().await;
    assert!(ada_view.revealed);
    assert_eq!(ada_view.average, Some(5.0));
    assert_eq!(ada_view.displayed_score.as_deref(), Some("5"));
    assert_eq!(ada_view.displayed_players, brin_view.displayed_players);

    session_service::save_score(&ada, None).await.expect("save");
    ada.resync().await.expect("resync");
    brin.resync().await.expect("resync");

    let frozen = ada.view().await;
    assert!(frozen.is_view_only);
    assert_eq!(frozen.displayed_score.as_deref(), Some("5"));
    assert_eq!(frozen.displayed_players.len(), 2);

    let saved = &store.tickets_in_room(&room).await.unwrap()[0];
    assert_eq!(saved.status, TicketStatus::Completed);
    assert_eq!(saved.score.as_deref(), Some("5"));
    assert_eq!(saved.votes_snapshot.as_ref().map(Vec::len), Some(2));

    // The frozen result does not move: voting is closed until a revote.
    let err = session_service::cast_vote(&brin, "8")
        .await
        .expect_err("view only");
    assert!(matches!(
        err,
        sprint_planio::error::ActionError::InvalidState(_)
    ));

    session_service::revote_ticket(&brin, ticket.id)
        .await
        .expect("revote");
    ada.resync().await.expect("resync");
    brin.resync().await.expect("resync");

    let reopened = ada.view().await;
    assert!(!reopened.is_view_only);
    assert!(!reopened.revealed);
    assert!(reopened.displayed_players.iter().all(|p| p.vote.is_none()));

    session_service::cast_vote(&brin, "8").await.expect("vote again");
}

#[tokio::test]
async fn a_peers_vote_arrives_through_the_change_feed_alone() {
    let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
    let room = RoomId::new("feed-e2e");

    let ada = join(&store, &room, "Ada").await;
    let brin = join(&store, &room, "Brin").await;
    let brin_id = brin.player_id();

    let mut changes = ada.watch_changes();
    session_service::cast_vote(&brin, "8")
        .await
        .expect("brin votes");

    // No resync anywhere: Ada's projection is refreshed by her feed task,
    // and the watch counter signals each applied notification.
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let seen = ada
                .view()
                .await
                .displayed_players
                .iter()
                .any(|p| p.id == brin_id && p.vote.as_deref() == Some("8"));
            if seen {
                break;
            }
            changes.changed().await.expect("session still open");
        }
    })
    .await
    .expect("feed delivers the vote");
}

#[tokio::test]
async fn a_reloading_client_rejoins_with_the_same_identity() {
    let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
    let room = RoomId::new("reload-e2e");
    let keys = MemorySessionKeys::new();
    let deck = AppConfig::default().default_deck();

    let before = join_service::join_room(store.clone(), &keys, room.clone(), "Ada", deck.clone())
        .await
        .expect("first join");
    session_service::cast_vote(&before, "8").await.expect("vote");
    let id = before.player_id();
    drop(before);

    let after = join_service::join_room(store.clone(), &keys, room.clone(), "Ada", deck)
        .await
        .expect("rejoin");

    // Same row, vote intact, no ghost player at the table.
    assert_eq!(after.player_id(), id);
    let view = after.view().await;
    assert_eq!(view.displayed_players.len(), 1);
    assert_eq!(view.displayed_players[0].vote.as_deref(), Some("8"));
}
