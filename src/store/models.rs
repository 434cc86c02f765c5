//! Durable row types and their partial-update patches.

use std::fmt;

use rand::{Rng, distr::Alphanumeric};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Number of characters in a generated room token.
const ROOM_TOKEN_LENGTH: usize = 12;

/// Opaque, URL-shareable token identifying a room.
///
/// Tokens are chosen by the first client that opens a room, so the type also
/// accepts arbitrary caller-provided strings (a room id pasted from a URL).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Wrap an existing token, e.g. one extracted from a shared URL.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Generate a fresh random alphanumeric token.
    pub fn generate() -> Self {
        let token: String = rand::rng()
            .sample_iter(Alphanumeric)
            .take(ROOM_TOKEN_LENGTH)
            .map(char::from)
            .collect();
        Self(token)
    }

    /// Borrow the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Store-assigned identifier of a player row.
pub type PlayerId = Uuid;

/// Store-assigned identifier of a ticket row.
pub type TicketId = Uuid;

/// Durable room row: one per voting session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomRow {
    /// Shareable room token.
    pub id: RoomId,
    /// Whether live votes are currently visible to everyone.
    pub is_revealed: bool,
    /// Ticket currently displayed on the table, if any. Weak reference:
    /// deleting the ticket clears this field rather than cascading.
    pub active_ticket_id: Option<TicketId>,
    /// Ordered set of selectable vote values.
    pub card_deck: Vec<String>,
}

impl RoomRow {
    /// Build a fresh, un-revealed room with the given deck.
    pub fn new(id: RoomId, card_deck: Vec<String>) -> Self {
        Self {
            id,
            is_revealed: false,
            active_ticket_id: None,
            card_deck,
        }
    }
}

/// Durable player row: one per joined browser session per room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRow {
    /// Store-assigned identifier.
    pub id: PlayerId,
    /// Room this player belongs to.
    pub room_id: RoomId,
    /// Display name taken from the external session.
    pub name: String,
    /// Current hidden vote; one of the room's deck values, or none.
    pub vote: Option<String>,
    /// Spectators are displayed but never counted in the average.
    pub is_spectator: bool,
}

/// Player fields supplied at creation; the store assigns the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPlayerRow {
    /// Room the player joins.
    pub room_id: RoomId,
    /// Display name for the new player.
    pub name: String,
    /// Whether the player joins as a spectator.
    pub is_spectator: bool,
}

/// Lifecycle of an agenda item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    /// Added to the agenda but never voted on.
    Pending,
    /// Currently selected for voting.
    Active,
    /// Scored; its snapshot is frozen until an explicit revote.
    Completed,
}

/// One player's vote as frozen at ticket completion time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteSnapshotEntry {
    /// Identifier of the player at snapshot time.
    pub player_id: PlayerId,
    /// Display name at snapshot time.
    pub name: String,
    /// The vote value; entries are only recorded for non-null votes.
    pub vote: String,
}

/// Durable ticket row: one agenda item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketRow {
    /// Store-assigned identifier.
    pub id: TicketId,
    /// Room this ticket belongs to.
    pub room_id: RoomId,
    /// Human readable agenda title.
    pub title: String,
    /// Lifecycle state.
    pub status: TicketStatus,
    /// Final recorded score, set when the ticket completes.
    pub score: Option<String>,
    /// Immutable copy of the votes at completion time.
    pub votes_snapshot: Option<Vec<VoteSnapshotEntry>>,
    /// Creation timestamp, used for stable agenda ordering.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Ticket fields supplied at creation; the store assigns id and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTicketRow {
    /// Room the ticket belongs to.
    pub room_id: RoomId,
    /// Agenda title.
    pub title: String,
}

/// Partial update for a room row.
///
/// Every field is tri-state on the wire: absent leaves the column untouched,
/// `null` clears it, a value replaces it (for columns that are nullable).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoomPatch {
    /// Replace the reveal flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_revealed: Option<bool>,
    /// Replace or clear the active ticket reference.
    #[serde(
        default,
        with = "serde_with::rust::double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub active_ticket_id: Option<Option<TicketId>>,
    /// Replace the card deck.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_deck: Option<Vec<String>>,
}

/// Partial update for a player row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerPatch {
    /// Replace or clear the player's vote.
    #[serde(
        default,
        with = "serde_with::rust::double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub vote: Option<Option<String>>,
    /// Replace the display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Replace the spectator flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_spectator: Option<bool>,
}

impl PlayerPatch {
    /// Patch that sets or clears the vote column only.
    pub fn vote(value: Option<String>) -> Self {
        Self {
            vote: Some(value),
            ..Self::default()
        }
    }
}

/// Partial update for a ticket row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketPatch {
    /// Replace the title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Replace the lifecycle state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TicketStatus>,
    /// Replace or clear the recorded score.
    #[serde(
        default,
        with = "serde_with::rust::double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub score: Option<Option<String>>,
    /// Replace or clear the frozen votes snapshot.
    #[serde(
        default,
        with = "serde_with::rust::double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub votes_snapshot: Option<Option<Vec<VoteSnapshotEntry>>>,
}

impl RoomRow {
    /// Apply a partial update in place.
    pub fn apply_patch(&mut self, patch: &RoomPatch) {
        if let Some(is_revealed) = patch.is_revealed {
            self.is_revealed = is_revealed;
        }
        if let Some(ref active) = patch.active_ticket_id {
            self.active_ticket_id = *active;
        }
        if let Some(ref deck) = patch.card_deck {
            self.card_deck = deck.clone();
        }
    }
}

impl PlayerRow {
    /// Apply a partial update in place.
    pub fn apply_patch(&mut self, patch: &PlayerPatch) {
        if let Some(ref vote) = patch.vote {
            self.vote = vote.clone();
        }
        if let Some(ref name) = patch.name {
            self.name = name.clone();
        }
        if let Some(is_spectator) = patch.is_spectator {
            self.is_spectator = is_spectator;
        }
    }
}

impl TicketRow {
    /// Apply a partial update in place.
    pub fn apply_patch(&mut self, patch: &TicketPatch) {
        if let Some(ref title) = patch.title {
            self.title = title.clone();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(ref score) = patch.score {
            self.score = score.clone();
        }
        if let Some(ref snapshot) = patch.votes_snapshot {
            self.votes_snapshot = snapshot.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_room_tokens_are_alphanumeric_and_distinct() {
        let a = RoomId::generate();
        let b = RoomId::generate();
        assert_eq!(a.as_str().len(), ROOM_TOKEN_LENGTH);
        assert!(a.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn patch_serialization_distinguishes_absent_from_null() {
        let untouched = TicketPatch::default();
        assert_eq!(serde_json::to_value(&untouched).unwrap(), serde_json::json!({}));

        let cleared = TicketPatch {
            score: Some(None),
            ..TicketPatch::default()
        };
        assert_eq!(
            serde_json::to_value(&cleared).unwrap(),
            serde_json::json!({ "score": null })
        );

        let set = TicketPatch {
            score: Some(Some("8".into())),
            ..TicketPatch::default()
        };
        assert_eq!(
            serde_json::to_value(&set).unwrap(),
            serde_json::json!({ "score": "8" })
        );
    }

    #[test]
    fn room_patch_clears_active_ticket() {
        let mut room = RoomRow::new(RoomId::new("r1"), vec!["1".into()]);
        room.active_ticket_id = Some(Uuid::new_v4());
        room.is_revealed = true;

        room.apply_patch(&RoomPatch {
            is_revealed: Some(false),
            active_ticket_id: Some(None),
            card_deck: None,
        });

        assert!(!room.is_revealed);
        assert!(room.active_ticket_id.is_none());
        assert_eq!(room.card_deck, vec!["1".to_string()]);
    }
}
