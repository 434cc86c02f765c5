//! Client-local identity storage backing the rejoin protocol.

use dashmap::DashMap;

use crate::store::models::{PlayerId, RoomId};

/// Durable client-local storage for player identities, scoped to one browser
/// session and keyed by room id.
///
/// This is a capability handed to the join protocol, never ambient state:
/// two sessions against the same room are distinguished solely by holding
/// different key stores.
pub trait SessionKeyStore: Send + Sync {
    /// Look up the player id previously persisted for a room.
    fn get(&self, room: &RoomId) -> Option<PlayerId>;
    /// Persist the player id to use for subsequent rejoins of a room.
    fn set(&self, room: &RoomId, player: PlayerId);
}

/// In-memory [`SessionKeyStore`], one instance per simulated session.
#[derive(Debug, Default)]
pub struct MemorySessionKeys {
    entries: DashMap<RoomId, PlayerId>,
}

impl MemorySessionKeys {
    /// Create an empty key store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionKeyStore for MemorySessionKeys {
    fn get(&self, room: &RoomId) -> Option<PlayerId> {
        self.entries.get(room).map(|entry| *entry)
    }

    fn set(&self, room: &RoomId, player: PlayerId) {
        self.entries.insert(room.clone(), player);
    }
}
