//! Pure derivation of presentation-relevant values from a projection.

use crate::store::models::{PlayerId, TicketRow, TicketStatus};

use super::reconcile::RoomProjection;

/// A player as shown on the table: either a live player or a snapshot entry.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayedPlayer {
    /// Player identifier (live or as recorded in the snapshot).
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Vote value; snapshot entries always carry one.
    pub vote: Option<String>,
}

/// Deterministic aggregate of the projection, recomputed on every change.
///
/// Implements `PartialEq` so observers can skip redundant refreshes when a
/// notification did not affect anything visible.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionView {
    /// The ticket currently referenced by the room, if it still exists.
    pub active_ticket: Option<TicketRow>,
    /// True when the active ticket is completed: the table shows its frozen
    /// snapshot and voting is closed.
    pub is_view_only: bool,
    /// Effective reveal state (view-only always shows votes).
    pub revealed: bool,
    /// Players shown on the table: the frozen snapshot in view-only mode,
    /// live players otherwise.
    pub displayed_players: Vec<DisplayedPlayer>,
    /// Numeric average over the displayed votes, when any are numeric.
    pub average: Option<f64>,
    /// What the score banner shows: the recorded score in view-only mode,
    /// the formatted average otherwise.
    pub displayed_score: Option<String>,
    /// The room's current card deck.
    pub deck: Vec<String>,
}

/// Derive the aggregate view from the current projection.
pub fn derive_view(projection: &RoomProjection) -> SessionView {
    let room = projection.room();

    let active_ticket = room
        .and_then(|r| r.active_ticket_id)
        .and_then(|id| projection.ticket(id))
        .cloned();

    let is_view_only = active_ticket
        .as_ref()
        .is_some_and(|t| t.status == TicketStatus::Completed);
    let revealed = is_view_only || room.is_some_and(|r| r.is_revealed);

    let displayed_players: Vec<DisplayedPlayer> = match (&active_ticket, is_view_only) {
        (Some(ticket), true) => ticket
            .votes_snapshot
            .iter()
            .flatten()
            .map(|entry| DisplayedPlayer {
                id: entry.player_id,
                name: entry.name.clone(),
                vote: Some(entry.vote.clone()),
            })
            .collect(),
        _ => projection
            .players()
            .map(|p| DisplayedPlayer {
                id: p.id,
                name: p.name.clone(),
                vote: p.vote.clone(),
            })
            .collect(),
    };

    // Spectator votes never count; snapshot entries were filtered at
    // completion time already.
    let average = if is_view_only {
        vote_average(displayed_players.iter().filter_map(|p| p.vote.as_deref()))
    } else {
        vote_average(
            projection
                .players()
                .filter(|p| !p.is_spectator)
                .filter_map(|p| p.vote.as_deref()),
        )
    };

    let displayed_score = match (&active_ticket, is_view_only) {
        (Some(ticket), true) if ticket.score.is_some() => ticket.score.clone(),
        _ => average.map(format_average),
    };

    SessionView {
        active_ticket,
        is_view_only,
        revealed,
        displayed_players,
        average,
        displayed_score,
        deck: room.map(|r| r.card_deck.clone()).unwrap_or_default(),
    }
}

/// Average of the numeric votes in the iterator.
///
/// Non-numeric tokens ("?", a coffee break) and non-positive values are
/// discarded so they never pollute the estimate; `None` when no vote
/// qualifies.
pub fn vote_average<'a>(votes: impl IntoIterator<Item = &'a str>) -> Option<f64> {
    let numeric: Vec<f64> = votes
        .into_iter()
        .filter_map(|vote| vote.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite() && *value > 0.0)
        .collect();

    if numeric.is_empty() {
        None
    } else {
        Some(numeric.iter().sum::<f64>() / numeric.len() as f64)
    }
}

/// Render an average without a spurious trailing `.0`.
pub fn format_average(value: f64) -> String {
    if value.fract().abs() < f64::EPSILON {
        format!("{}", value as i64)
    } else {
        format!("{value:.1}")
    }
}
