//! Per-client session state: the projection, its feed task, and the handle
//! every action goes through.

pub mod identity;
pub mod reconcile;
pub mod view;

use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tokio::sync::{RwLock, RwLockReadGuard, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::store::error::StoreResult;
use crate::store::models::{PlayerId, RoomId};
use crate::store::{ChangeEvent, RoomFeed, SharedStore};

use self::reconcile::RoomProjection;
use self::view::{SessionView, derive_view};

/// Shared handle to one client's session, cloned cheaply across tasks.
pub type SharedSession = Arc<SessionState>;

/// One client's connection to a room: store handle, resolved identity, the
/// reconciled projection, and the feed task keeping it fresh.
///
/// All coordination with other clients goes through the store; two
/// `SessionState` values never share memory even when they observe the same
/// room through the same process.
pub struct SessionState {
    store: Arc<dyn SharedStore>,
    room_id: RoomId,
    player_id: PlayerId,
    projection: RwLock<RoomProjection>,
    changed: watch::Sender<u64>,
    feed_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionState {
    /// Wrap a joined session into a shared handle.
    pub(crate) fn new(
        store: Arc<dyn SharedStore>,
        room_id: RoomId,
        player_id: PlayerId,
        projection: RoomProjection,
    ) -> SharedSession {
        let (changed, _receiver) = watch::channel(0);
        Arc::new(Self {
            store,
            room_id,
            player_id,
            projection: RwLock::new(projection),
            changed,
            feed_task: Mutex::new(None),
        })
    }

    /// Store capability this session writes through.
    pub fn store(&self) -> &Arc<dyn SharedStore> {
        &self.store
    }

    /// The observed room.
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// The player row this session owns.
    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    /// Read access to the raw projection.
    pub async fn projection(&self) -> RwLockReadGuard<'_, RoomProjection> {
        self.projection.read().await
    }

    /// Derive the current aggregate view.
    pub async fn view(&self) -> SessionView {
        derive_view(&*self.projection.read().await)
    }

    /// Subscribe to a counter bumped whenever the projection changes.
    pub fn watch_changes(&self) -> watch::Receiver<u64> {
        self.changed.subscribe()
    }

    /// Apply one change notification to the projection.
    ///
    /// Also used by actions for optimistic local overlays: the apply rules
    /// are idempotent, so the authoritative notification that follows simply
    /// converges onto the same state.
    pub async fn apply_event(&self, event: ChangeEvent) {
        let changed = {
            let mut projection = self.projection.write().await;
            projection.apply(event)
        };
        if changed {
            self.changed.send_modify(|version| *version += 1);
        }
    }

    /// Replace the projection with a fresh bulk read from the store.
    ///
    /// Recovery path for clients that suspect they missed notifications;
    /// routine operation never needs it.
    pub async fn resync(&self) -> StoreResult<()> {
        let room = self.store.find_room(&self.room_id).await?;
        let players = self.store.players_in_room(&self.room_id).await?;
        let tickets = self.store.tickets_in_room(&self.room_id).await?;

        {
            let mut projection = self.projection.write().await;
            *projection = RoomProjection::seed(room, players, tickets);
        }
        self.changed.send_modify(|version| *version += 1);
        debug!(room = %self.room_id, "projection resynced from store");
        Ok(())
    }

    /// Spawn the task draining the room feed into the projection.
    ///
    /// The task holds only a weak handle, so dropping the session ends it.
    pub(crate) fn attach_feed(self: &Arc<Self>, feed: RoomFeed) {
        let session = Arc::downgrade(self);
        let room = self.room_id.clone();
        let task = tokio::spawn(async move {
            let mut feed = feed;
            while let Some(event) = feed.next().await {
                let Some(session) = session.upgrade() else {
                    break;
                };
                session.apply_event(event).await;
            }
            debug!(room = %room, "room feed ended");
        });

        match self.feed_task.lock() {
            Ok(mut slot) => {
                if let Some(previous) = slot.replace(task) {
                    previous.abort();
                }
            }
            Err(_) => warn!(room = %self.room_id, "feed task slot poisoned"),
        }
    }

    /// Stop observing the room, releasing the store subscription.
    pub fn close(&self) {
        if let Ok(mut slot) = self.feed_task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

impl Drop for SessionState {
    fn drop(&mut self) {
        self.close();
    }
}
