//! Demo binary driving two clients through a full estimation round in-process.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sprint_planio::config::AppConfig;
use sprint_planio::services::{join_service, session_service};
use sprint_planio::session::identity::MemorySessionKeys;
use sprint_planio::store::SharedStore;
use sprint_planio::store::memory::MemoryStore;
use sprint_planio::store::models::RoomId;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
    let room = RoomId::generate();
    info!(room = %room, "running demo round");

    // Two independent key stores stand in for two browsers.
    let ada_keys = MemorySessionKeys::new();
    let brin_keys = MemorySessionKeys::new();

    let ada = join_service::join_room(
        store.clone(),
        &ada_keys,
        room.clone(),
        "Ada",
        config.default_deck(),
    )
    .await
    .context("joining as Ada")?;
    let brin = join_service::join_room(
        store.clone(),
        &brin_keys,
        room.clone(),
        "Brin",
        config.default_deck(),
    )
    .await
    .context("joining as Brin")?;

    let ticket = session_service::add_ticket(&ada, "Checkout flow")
        .await
        .context("adding ticket")?;
    session_service::set_active_ticket(&ada, ticket.id)
        .await
        .context("activating ticket")?;

    ada.resync().await.context("refreshing Ada's view")?;
    brin.resync().await.context("refreshing Brin's view")?;

    session_service::cast_vote(&ada, "5")
        .await
        .context("Ada voting")?;
    session_service::cast_vote(&brin, "8")
        .await
        .context("Brin voting")?;

    session_service::reveal_votes(&ada)
        .await
        .context("revealing votes")?;
    ada.resync().await.context("refreshing Ada's view")?;

    let view = ada.view().await;
    info!(
        average = ?view.average,
        score = ?view.displayed_score,
        "votes revealed"
    );

    session_service::save_score(&ada, None)
        .await
        .context("saving score")?;
    ada.resync().await.context("refreshing Ada's view")?;

    let view = ada.view().await;
    info!(
        ticket = %ticket.id,
        score = ?view.displayed_score,
        voters = view.displayed_players.len(),
        "ticket completed"
    );

    session_service::leave_room(&brin).await;
    session_service::leave_room(&ada).await;
    Ok(())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
