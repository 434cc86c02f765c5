//! Validation helpers for action inputs.

use validator::ValidationError;

/// Validates that a ticket title contains at least one visible character.
pub fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        let mut err = ValidationError::new("title_blank");
        err.message = Some("Title must not be empty".into());
        return Err(err);
    }
    Ok(())
}

/// Validates that a card deck keeps at least one non-blank card.
pub fn validate_deck(cards: &[String]) -> Result<(), ValidationError> {
    if !cards.iter().any(|card| !card.trim().is_empty()) {
        let mut err = ValidationError::new("deck_empty");
        err.message = Some("Deck must contain at least one card".into());
        return Err(err);
    }
    Ok(())
}

/// Validates that an explicit score override is not blank.
pub fn validate_score(score: &str) -> Result<(), ValidationError> {
    if score.trim().is_empty() {
        let mut err = ValidationError::new("score_blank");
        err.message = Some("Score must not be empty".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_rejects_blank_values() {
        assert!(validate_title("Checkout flow").is_ok());
        assert!(validate_title("").is_err());
        assert!(validate_title("   ").is_err());
    }

    #[test]
    fn deck_requires_one_usable_card() {
        assert!(validate_deck(&["1".into(), "2".into()]).is_ok());
        assert!(validate_deck(&[]).is_err());
        assert!(validate_deck(&["".into(), "  ".into()]).is_err());
    }

    #[test]
    fn score_rejects_blank_values() {
        assert!(validate_score("8").is_ok());
        assert!(validate_score("XL").is_ok());
        assert!(validate_score(" ").is_err());
    }
}
