//! Validated inputs for session actions.

pub mod validation;

use serde::Deserialize;
use validator::Validate;

use self::validation::{validate_deck, validate_score, validate_title};

/// Title supplied when adding or renaming an agenda ticket.
#[derive(Debug, Deserialize, Validate)]
pub struct TicketTitleInput {
    /// Human readable ticket title; must not be blank.
    #[validate(custom(function = validate_title))]
    pub title: String,
}

/// Replacement card deck supplied through the room settings.
#[derive(Debug, Deserialize, Validate)]
pub struct DeckInput {
    /// New deck values; must keep at least one non-blank card.
    #[validate(custom(function = validate_deck))]
    pub cards: Vec<String>,
}

impl DeckInput {
    /// Trimmed, non-blank cards in their original order.
    pub fn cleaned(&self) -> Vec<String> {
        self.cards
            .iter()
            .map(|card| card.trim().to_owned())
            .filter(|card| !card.is_empty())
            .collect()
    }
}

/// Explicit score supplied instead of (or after) the computed average.
#[derive(Debug, Deserialize, Validate)]
pub struct ScoreInput {
    /// Score to record; must not be blank.
    #[validate(custom(function = validate_score))]
    pub score: String,
}
