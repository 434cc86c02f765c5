use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, future::BoxFuture};
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use tokio::time::MissedTickBehavior;
use tracing::warn;
use uuid::Uuid;

use crate::store::error::StoreResult;
use crate::store::models::{
    NewPlayerRow, NewTicketRow, PlayerId, PlayerPatch, PlayerRow, RoomId, RoomPatch, RoomRow,
    TicketId, TicketPatch, TicketRow,
};
use crate::store::{ChangeEvent, RoomFeed, SharedStore};

use super::{
    config::RestConfig,
    error::{RestDaoError, RestResult},
};

const ROOMS: &str = "rooms";
const PLAYERS: &str = "players";
const TICKETS: &str = "tickets";

/// [`SharedStore`] backend over a PostgREST-style row API.
///
/// The API exposes durable row CRUD but no push channel of its own, so
/// [`SharedStore::subscribe`] is a best-effort polling diff: every interval
/// the room's rows are re-read and compared against the previous pass, and
/// the differences are emitted as change events. That satisfies the feed
/// contract (at-least-once, unordered) without any transport of our own.
#[derive(Clone)]
pub struct RestStore {
    client: Client,
    base_url: Arc<str>,
    api_key: Option<Arc<str>>,
    poll_interval: Duration,
}

impl RestStore {
    /// Build a client for the configured endpoint.
    pub fn connect(config: RestConfig) -> RestResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| RestDaoError::ClientBuilder { source })?;

        Ok(Self {
            client,
            base_url: Arc::from(config.base_url.trim_end_matches('/')),
            api_key: config.api_key.map(Arc::from),
            poll_interval: config.poll_interval,
        })
    }

    fn request(&self, method: Method, table: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, table);
        let builder = self.client.request(method, url);
        if let Some(ref key) = self.api_key {
            builder
                .header("apikey", key.as_ref())
                .bearer_auth(key.as_ref())
        } else {
            builder
        }
    }

    async fn select_rows<T>(
        &self,
        table: &'static str,
        filters: &[(&str, String)],
    ) -> RestResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, table)
            .query(filters)
            .send()
            .await
            .map_err(|source| RestDaoError::RequestSend {
                path: table.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(RestDaoError::RequestStatus {
                path: table.to_string(),
                status: response.status(),
            });
        }

        response
            .json::<Vec<T>>()
            .await
            .map_err(|source| RestDaoError::DecodeResponse {
                path: table.to_string(),
                source,
            })
    }

    async fn insert_row<In, Out>(
        &self,
        table: &'static str,
        row: &In,
        conflict_id: String,
    ) -> RestResult<Out>
    where
        In: Serialize + ?Sized,
        Out: DeserializeOwned,
    {
        let response = self
            .request(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await
            .map_err(|source| RestDaoError::RequestSend {
                path: table.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT => Err(RestDaoError::Conflict {
                table,
                id: conflict_id,
            }),
            status if status.is_success() => {
                let rows: Vec<Out> =
                    response
                        .json()
                        .await
                        .map_err(|source| RestDaoError::DecodeResponse {
                            path: table.to_string(),
                            source,
                        })?;
                rows.into_iter()
                    .next()
                    .ok_or(RestDaoError::EmptyInsert { table })
            }
            status => Err(RestDaoError::RequestStatus {
                path: table.to_string(),
                status,
            }),
        }
    }

    async fn patch_rows<P>(
        &self,
        table: &'static str,
        filters: &[(&str, String)],
        patch: &P,
    ) -> RestResult<()>
    where
        P: Serialize + ?Sized,
    {
        let response = self
            .request(Method::PATCH, table)
            .query(filters)
            .json(patch)
            .send()
            .await
            .map_err(|source| RestDaoError::RequestSend {
                path: table.to_string(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(RestDaoError::RequestStatus {
                path: table.to_string(),
                status: response.status(),
            })
        }
    }

    async fn delete_rows(&self, table: &'static str, filters: &[(&str, String)]) -> RestResult<()> {
        let response = self
            .request(Method::DELETE, table)
            .query(filters)
            .send()
            .await
            .map_err(|source| RestDaoError::RequestSend {
                path: table.to_string(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(RestDaoError::RequestStatus {
                path: table.to_string(),
                status: response.status(),
            })
        }
    }

    async fn poll_room_rows(
        &self,
        room: &RoomId,
    ) -> RestResult<(Option<RoomRow>, Vec<PlayerRow>, Vec<TicketRow>)> {
        let rooms: Vec<RoomRow> = self
            .select_rows(ROOMS, &[("id", eq_filter(room.as_str()))])
            .await?;
        let players = self
            .select_rows(PLAYERS, &[("room_id", eq_filter(room.as_str()))])
            .await?;
        let tickets = self
            .select_rows(
                TICKETS,
                &[
                    ("room_id", eq_filter(room.as_str())),
                    ("order", "created_at.asc".to_string()),
                ],
            )
            .await?;
        Ok((rooms.into_iter().next(), players, tickets))
    }
}

fn eq_filter(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

/// Compare two keyed row sets and emit insert/update/delete events for the
/// differences.
fn diff_rows<T, F>(
    previous: &mut HashMap<Uuid, T>,
    current: Vec<T>,
    key: fn(&T) -> Uuid,
    events: &mut Vec<ChangeEvent>,
    make: F,
    deleted: fn(Uuid) -> ChangeEvent,
) where
    T: Clone + PartialEq,
    F: Fn(T, bool) -> ChangeEvent,
{
    let mut next = HashMap::with_capacity(current.len());
    for row in current {
        let id = key(&row);
        match previous.remove(&id) {
            None => events.push(make(row.clone(), true)),
            Some(old) if old != row => events.push(make(row.clone(), false)),
            Some(_) => {}
        }
        next.insert(id, row);
    }
    for id in previous.keys() {
        events.push(deleted(*id));
    }
    *previous = next;
}

impl SharedStore for RestStore {
    fn find_room(&self, id: &RoomId) -> BoxFuture<'static, StoreResult<Option<RoomRow>>> {
        let store = self.clone();
        let id = id.clone();
        Box::pin(async move {
            let rows: Vec<RoomRow> = store
                .select_rows(ROOMS, &[("id", eq_filter(id.as_str()))])
                .await?;
            Ok(rows.into_iter().next())
        })
    }

    fn insert_room(&self, row: RoomRow) -> BoxFuture<'static, StoreResult<RoomRow>> {
        let store = self.clone();
        Box::pin(async move {
            let id = row.id.to_string();
            Ok(store.insert_row(ROOMS, &row, id).await?)
        })
    }

    fn update_room(&self, id: &RoomId, patch: RoomPatch) -> BoxFuture<'static, StoreResult<()>> {
        let store = self.clone();
        let id = id.clone();
        Box::pin(async move {
            store
                .patch_rows(ROOMS, &[("id", eq_filter(id.as_str()))], &patch)
                .await?;
            Ok(())
        })
    }

    fn find_player(&self, id: PlayerId) -> BoxFuture<'static, StoreResult<Option<PlayerRow>>> {
        let store = self.clone();
        Box::pin(async move {
            let rows: Vec<PlayerRow> = store.select_rows(PLAYERS, &[("id", eq_filter(id))]).await?;
            Ok(rows.into_iter().next())
        })
    }

    fn players_in_room(&self, room: &RoomId) -> BoxFuture<'static, StoreResult<Vec<PlayerRow>>> {
        let store = self.clone();
        let room = room.clone();
        Box::pin(async move {
            Ok(store
                .select_rows(PLAYERS, &[("room_id", eq_filter(room.as_str()))])
                .await?)
        })
    }

    fn insert_player(&self, row: NewPlayerRow) -> BoxFuture<'static, StoreResult<PlayerRow>> {
        let store = self.clone();
        Box::pin(async move {
            // The store assigns the id, so a conflict can only name the row
            // by what the caller supplied.
            let label = row.name.clone();
            Ok(store.insert_row(PLAYERS, &row, label).await?)
        })
    }

    fn update_player(
        &self,
        id: PlayerId,
        patch: PlayerPatch,
    ) -> BoxFuture<'static, StoreResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .patch_rows(PLAYERS, &[("id", eq_filter(id))], &patch)
                .await?;
            Ok(())
        })
    }

    fn update_players_in_room(
        &self,
        room: &RoomId,
        patch: PlayerPatch,
    ) -> BoxFuture<'static, StoreResult<()>> {
        let store = self.clone();
        let room = room.clone();
        Box::pin(async move {
            store
                .patch_rows(PLAYERS, &[("room_id", eq_filter(room.as_str()))], &patch)
                .await?;
            Ok(())
        })
    }

    fn delete_player(&self, id: PlayerId) -> BoxFuture<'static, StoreResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete_rows(PLAYERS, &[("id", eq_filter(id))])
                .await?;
            Ok(())
        })
    }

    fn tickets_in_room(&self, room: &RoomId) -> BoxFuture<'static, StoreResult<Vec<TicketRow>>> {
        let store = self.clone();
        let room = room.clone();
        Box::pin(async move {
            Ok(store
                .select_rows(
                    TICKETS,
                    &[
                        ("room_id", eq_filter(room.as_str())),
                        ("order", "created_at.asc".to_string()),
                    ],
                )
                .await?)
        })
    }

    fn insert_ticket(&self, row: NewTicketRow) -> BoxFuture<'static, StoreResult<TicketRow>> {
        let store = self.clone();
        Box::pin(async move {
            let label = row.title.clone();
            Ok(store.insert_row(TICKETS, &row, label).await?)
        })
    }

    fn update_ticket(
        &self,
        id: TicketId,
        patch: TicketPatch,
    ) -> BoxFuture<'static, StoreResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .patch_rows(TICKETS, &[("id", eq_filter(id))], &patch)
                .await?;
            Ok(())
        })
    }

    fn delete_ticket(&self, id: TicketId) -> BoxFuture<'static, StoreResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete_rows(TICKETS, &[("id", eq_filter(id))])
                .await?;
            Ok(())
        })
    }

    fn subscribe(&self, room: &RoomId) -> BoxFuture<'static, StoreResult<RoomFeed>> {
        let store = self.clone();
        let room = room.clone();
        Box::pin(async move {
            // Seed the diff baseline before streaming so the subscriber only
            // sees changes that happen after the subscription was taken.
            let (room_row, players, tickets) = store.poll_room_rows(&room).await?;
            let mut last_room = room_row;
            let mut last_players: HashMap<Uuid, PlayerRow> =
                players.into_iter().map(|p| (p.id, p)).collect();
            let mut last_tickets: HashMap<Uuid, TicketRow> =
                tickets.into_iter().map(|t| (t.id, t)).collect();

            let feed = async_stream::stream! {
                let mut ticker = tokio::time::interval(store.poll_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // First tick completes immediately; skip it so the first
                // diff pass happens one interval after the seed read.
                ticker.tick().await;

                loop {
                    ticker.tick().await;

                    let (room_row, players, tickets) = match store.poll_room_rows(&room).await {
                        Ok(rows) => rows,
                        Err(err) => {
                            // Feed delivery is best-effort; the next pass
                            // re-reads everything anyway.
                            warn!(room = %room, error = %err, "change-feed poll failed");
                            continue;
                        }
                    };

                    let mut events = Vec::new();
                    if room_row != last_room {
                        if let Some(ref row) = room_row {
                            events.push(ChangeEvent::RoomUpdated(row.clone()));
                        }
                        last_room = room_row;
                    }
                    diff_rows(
                        &mut last_players,
                        players,
                        |p| p.id,
                        &mut events,
                        |row, inserted| if inserted {
                            ChangeEvent::PlayerInserted(row)
                        } else {
                            ChangeEvent::PlayerUpdated(row)
                        },
                        ChangeEvent::PlayerDeleted,
                    );
                    diff_rows(
                        &mut last_tickets,
                        tickets,
                        |t| t.id,
                        &mut events,
                        |row, inserted| if inserted {
                            ChangeEvent::TicketInserted(row)
                        } else {
                            ChangeEvent::TicketUpdated(row)
                        },
                        ChangeEvent::TicketDeleted,
                    );

                    for event in events {
                        yield event;
                    }
                }
            };

            Ok(feed.boxed() as RoomFeed)
        })
    }
}
