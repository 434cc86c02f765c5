//! Session actions: every state transition a client can perform on a room.
//!
//! Each action validates against the local projection, then writes through
//! the store. Where the written row is fully known locally the change is also
//! overlaid optimistically; the authoritative feed notification that follows
//! converges onto the same state because the apply rules are idempotent.

use tracing::{debug, warn};
use validator::Validate;

use crate::dto::{DeckInput, ScoreInput, TicketTitleInput};
use crate::error::ActionError;
use crate::session::SessionState;
use crate::session::view::{derive_view, format_average, vote_average};
use crate::store::ChangeEvent;
use crate::store::models::{
    NewTicketRow, PlayerPatch, RoomPatch, TicketId, TicketPatch, TicketRow, TicketStatus,
    VoteSnapshotEntry,
};

/// Cast, change, or withdraw this session's vote.
///
/// Picking the card that is already selected withdraws the vote. Rejected
/// while votes are revealed or while a completed ticket is displayed.
pub async fn cast_vote(session: &SessionState, value: &str) -> Result<(), ActionError> {
    let (mut own_row, next) = {
        let projection = session.projection().await;
        let view = derive_view(&projection);
        if view.is_view_only {
            return Err(ActionError::InvalidState(
                "voting is closed while a completed ticket is displayed".into(),
            ));
        }
        if view.revealed {
            return Err(ActionError::InvalidState(
                "votes are revealed; reset the round before voting again".into(),
            ));
        }
        if !view.deck.iter().any(|card| card == value) {
            return Err(ActionError::Validation(format!(
                "`{value}` is not one of the room's cards"
            )));
        }

        let own = projection
            .player(session.player_id())
            .cloned()
            .ok_or_else(|| ActionError::NotFound("own player row is gone from the room".into()))?;
        if own.is_spectator {
            return Err(ActionError::InvalidState("spectators cannot vote".into()));
        }

        let next = if own.vote.as_deref() == Some(value) {
            None
        } else {
            Some(value.to_owned())
        };
        (own, next)
    };

    session
        .store()
        .update_player(session.player_id(), PlayerPatch::vote(next.clone()))
        .await?;

    own_row.vote = next;
    session
        .apply_event(ChangeEvent::PlayerUpdated(own_row))
        .await;
    Ok(())
}

/// Make every live vote in the room visible.
pub async fn reveal_votes(session: &SessionState) -> Result<(), ActionError> {
    session
        .store()
        .update_room(
            session.room_id(),
            RoomPatch {
                is_revealed: Some(true),
                ..RoomPatch::default()
            },
        )
        .await?;
    Ok(())
}

/// Hide the table again and clear every player's vote for a fresh round.
pub async fn reset_round(session: &SessionState) -> Result<(), ActionError> {
    session
        .store()
        .update_room(
            session.room_id(),
            RoomPatch {
                is_revealed: Some(false),
                ..RoomPatch::default()
            },
        )
        .await?;
    session
        .store()
        .update_players_in_room(session.room_id(), PlayerPatch::vote(None))
        .await?;
    Ok(())
}

/// Add a ticket to the agenda in `pending` state.
pub async fn add_ticket(session: &SessionState, title: &str) -> Result<TicketRow, ActionError> {
    let input = TicketTitleInput {
        title: title.to_owned(),
    };
    input.validate()?;

    let row = session
        .store()
        .insert_ticket(NewTicketRow {
            room_id: session.room_id().clone(),
            title: input.title.trim().to_owned(),
        })
        .await?;
    debug!(room = %session.room_id(), ticket = %row.id, "ticket added to agenda");
    session
        .apply_event(ChangeEvent::TicketInserted(row.clone()))
        .await;
    Ok(row)
}

/// Put a ticket on the table.
///
/// A pending or active ticket starts a fresh round: the table is hidden and
/// every vote cleared. A completed ticket is merely displayed; its frozen
/// result stays untouched and the current live votes survive.
pub async fn set_active_ticket(
    session: &SessionState,
    ticket_id: TicketId,
) -> Result<(), ActionError> {
    let status = {
        let projection = session.projection().await;
        projection
            .ticket(ticket_id)
            .map(|t| t.status)
            .ok_or_else(|| {
                ActionError::NotFound(format!("ticket `{ticket_id}` is not on the agenda"))
            })?
    };

    if status == TicketStatus::Completed {
        session
            .store()
            .update_room(
                session.room_id(),
                RoomPatch {
                    active_ticket_id: Some(Some(ticket_id)),
                    ..RoomPatch::default()
                },
            )
            .await?;
        return Ok(());
    }

    session
        .store()
        .update_room(
            session.room_id(),
            RoomPatch {
                is_revealed: Some(false),
                active_ticket_id: Some(Some(ticket_id)),
                card_deck: None,
            },
        )
        .await?;
    session
        .store()
        .update_ticket(
            ticket_id,
            TicketPatch {
                status: Some(TicketStatus::Active),
                ..TicketPatch::default()
            },
        )
        .await?;
    session
        .store()
        .update_players_in_room(session.room_id(), PlayerPatch::vote(None))
        .await?;
    Ok(())
}

/// Complete the ticket on the table, freezing score and votes.
///
/// The score is the explicit override when given, otherwise the formatted
/// average of the current numeric votes. The snapshot records every
/// non-spectator holding a vote at this instant, the same set the average is
/// computed from; it is what the table shows from now on.
pub async fn save_score(
    session: &SessionState,
    score_override: Option<&str>,
) -> Result<(), ActionError> {
    let (ticket_id, score, snapshot) = {
        let projection = session.projection().await;
        let active_id = projection
            .room()
            .and_then(|room| room.active_ticket_id)
            .ok_or_else(|| ActionError::InvalidState("no ticket is being voted on".into()))?;
        let ticket = projection.ticket(active_id).ok_or_else(|| {
            ActionError::NotFound(format!("active ticket `{active_id}` is not on the agenda"))
        })?;
        if ticket.status == TicketStatus::Completed {
            return Err(ActionError::InvalidState(
                "ticket is already completed".into(),
            ));
        }

        let score = match score_override {
            Some(value) => {
                let input = ScoreInput {
                    score: value.to_owned(),
                };
                input.validate()?;
                input.score.trim().to_owned()
            }
            None => {
                let votes = projection
                    .players()
                    .filter(|p| !p.is_spectator)
                    .filter_map(|p| p.vote.as_deref());
                vote_average(votes).map(format_average).ok_or_else(|| {
                    ActionError::InvalidState(
                        "no numeric votes to average; provide a score explicitly".into(),
                    )
                })?
            }
        };

        let snapshot: Vec<VoteSnapshotEntry> = projection
            .players()
            .filter(|p| !p.is_spectator)
            .filter_map(|p| {
                p.vote.as_ref().map(|vote| VoteSnapshotEntry {
                    player_id: p.id,
                    name: p.name.clone(),
                    vote: vote.clone(),
                })
            })
            .collect();
        (active_id, score, snapshot)
    };

    debug!(room = %session.room_id(), ticket = %ticket_id, score = %score, "ticket completed");
    session
        .store()
        .update_ticket(
            ticket_id,
            TicketPatch {
                status: Some(TicketStatus::Completed),
                score: Some(Some(score)),
                votes_snapshot: Some(Some(snapshot)),
                title: None,
            },
        )
        .await?;
    Ok(())
}

/// Correct the recorded score of a completed ticket.
///
/// Touches the score only; the frozen snapshot stays as voted.
pub async fn edit_completed_score(
    session: &SessionState,
    ticket_id: TicketId,
    score: &str,
) -> Result<(), ActionError> {
    let input = ScoreInput {
        score: score.to_owned(),
    };
    input.validate()?;

    {
        let projection = session.projection().await;
        let ticket = projection.ticket(ticket_id).ok_or_else(|| {
            ActionError::NotFound(format!("ticket `{ticket_id}` is not on the agenda"))
        })?;
        if ticket.status != TicketStatus::Completed {
            return Err(ActionError::InvalidState(
                "only completed tickets carry an editable score".into(),
            ));
        }
    }

    session
        .store()
        .update_ticket(
            ticket_id,
            TicketPatch {
                score: Some(Some(input.score.trim().to_owned())),
                ..TicketPatch::default()
            },
        )
        .await?;
    Ok(())
}

/// Rename a ticket that has not been completed yet.
pub async fn rename_ticket(
    session: &SessionState,
    ticket_id: TicketId,
    title: &str,
) -> Result<(), ActionError> {
    let input = TicketTitleInput {
        title: title.to_owned(),
    };
    input.validate()?;

    {
        let projection = session.projection().await;
        let ticket = projection.ticket(ticket_id).ok_or_else(|| {
            ActionError::NotFound(format!("ticket `{ticket_id}` is not on the agenda"))
        })?;
        if ticket.status == TicketStatus::Completed {
            return Err(ActionError::InvalidState(
                "completed tickets keep the title they were scored under".into(),
            ));
        }
    }

    session
        .store()
        .update_ticket(
            ticket_id,
            TicketPatch {
                title: Some(input.title.trim().to_owned()),
                ..TicketPatch::default()
            },
        )
        .await?;
    Ok(())
}

/// Remove a ticket from the agenda.
///
/// Deleting the ticket on the table first detaches it from the room and
/// hides the votes, so no client is left staring at a dangling reference.
pub async fn delete_ticket(session: &SessionState, ticket_id: TicketId) -> Result<(), ActionError> {
    let is_active = {
        let projection = session.projection().await;
        if projection.ticket(ticket_id).is_none() {
            return Err(ActionError::NotFound(format!(
                "ticket `{ticket_id}` is not on the agenda"
            )));
        }
        projection.room().and_then(|room| room.active_ticket_id) == Some(ticket_id)
    };

    if is_active {
        session
            .store()
            .update_room(
                session.room_id(),
                RoomPatch {
                    is_revealed: Some(false),
                    active_ticket_id: Some(None),
                    card_deck: None,
                },
            )
            .await?;
    }
    session.store().delete_ticket(ticket_id).await?;
    session
        .apply_event(ChangeEvent::TicketDeleted(ticket_id))
        .await;
    Ok(())
}

/// Reopen a completed ticket for another round of voting.
///
/// Clears its recorded score and snapshot, puts it back on the table, and
/// starts a fresh hidden round.
pub async fn revote_ticket(session: &SessionState, ticket_id: TicketId) -> Result<(), ActionError> {
    {
        let projection = session.projection().await;
        let ticket = projection.ticket(ticket_id).ok_or_else(|| {
            ActionError::NotFound(format!("ticket `{ticket_id}` is not on the agenda"))
        })?;
        if ticket.status != TicketStatus::Completed {
            return Err(ActionError::InvalidState(
                "only completed tickets can be reopened".into(),
            ));
        }
    }

    session
        .store()
        .update_room(
            session.room_id(),
            RoomPatch {
                is_revealed: Some(false),
                active_ticket_id: Some(Some(ticket_id)),
                card_deck: None,
            },
        )
        .await?;
    session
        .store()
        .update_ticket(
            ticket_id,
            TicketPatch {
                status: Some(TicketStatus::Active),
                score: Some(None),
                votes_snapshot: Some(None),
                title: None,
            },
        )
        .await?;
    session
        .store()
        .update_players_in_room(session.room_id(), PlayerPatch::vote(None))
        .await?;
    Ok(())
}

/// Replace the room's card deck.
///
/// Cards are trimmed and blank entries dropped; votes already cast are left
/// alone even when their card is no longer in the deck.
pub async fn update_deck(session: &SessionState, cards: Vec<String>) -> Result<(), ActionError> {
    let input = DeckInput { cards };
    input.validate()?;

    session
        .store()
        .update_room(
            session.room_id(),
            RoomPatch {
                card_deck: Some(input.cleaned()),
                ..RoomPatch::default()
            },
        )
        .await?;
    Ok(())
}

/// Leave the room, removing this session's player row.
///
/// Removal is best effort: a store failure is logged and the session is
/// closed regardless, since the client is gone either way.
pub async fn leave_room(session: &SessionState) {
    if let Err(err) = session.store().delete_player(session.player_id()).await {
        warn!(
            room = %session.room_id(),
            player = %session.player_id(),
            error = %err,
            "failed to remove player row on leave",
        );
    }
    session.close();
}
