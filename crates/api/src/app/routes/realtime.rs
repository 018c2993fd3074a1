//! Server-Sent Events over the realtime hub.
//!
//! A subscriber always joins `user:<self>` (plus `deliveries` for couriers)
//! and may ask for more rooms with `?rooms=order:<id>,restaurant:<id>`.

use std::collections::HashSet;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Extension;
use axum::response::sse::{Event, KeepAlive, Sse};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, info};

use miam_auth::Role;
use miam_auth::permissions::realtime;
use miam_infra::{RealtimeMessage, Room};

use crate::app::dto::{self, AppQuery};
use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::orders::visible_order;
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::PrincipalContext;

const KEEP_ALIVE: Duration = Duration::from_secs(15);

pub async fn stream(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    AppQuery(query): AppQuery<dto::RealtimeQuery>,
) -> ApiResult<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>> {
    require(&principal, &realtime::SUBSCRIBE)?;
    let rooms = joined_rooms(&services, &principal, query.rooms.as_deref())?;
    info!(user_id = %principal.user_id(), rooms = rooms.len(), "realtime subscriber joined");

    let mut last_seen: Option<DedupKey> = None;
    let events = BroadcastStream::new(services.platform.hub.subscribe()).filter_map(move |msg| {
        let msg = match msg {
            Ok(msg) => msg,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                debug!(skipped, "realtime subscriber lagged");
                return None;
            }
        };
        if !rooms.contains(&msg.room) {
            return None;
        }
        // One event fans out to several rooms; a subscriber in more than one
        // of them sees it once.
        let key = DedupKey::of(&msg);
        if last_seen.as_ref() == Some(&key) {
            return None;
        }
        last_seen = Some(key);
        Event::default().event(msg.event).json_data(&msg).ok().map(Ok)
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE)))
}

#[derive(Debug, PartialEq, Eq)]
struct DedupKey {
    event: &'static str,
    aggregate_id: Option<String>,
    sequence: Option<u64>,
}

impl DedupKey {
    fn of(msg: &RealtimeMessage) -> Self {
        Self {
            event: msg.event,
            aggregate_id: msg.data["aggregate_id"].as_str().map(str::to_string),
            sequence: msg.data["sequence"].as_u64(),
        }
    }
}

fn joined_rooms(
    services: &AppServices,
    principal: &PrincipalContext,
    requested: Option<&str>,
) -> ApiResult<HashSet<Room>> {
    let mut rooms = HashSet::from([Room::User(principal.user_id())]);
    if principal.role() == Role::Livreur {
        rooms.insert(Room::Deliveries);
    }

    let requested = requested.unwrap_or_default().split(',').filter(|s| !s.trim().is_empty());
    for raw in requested {
        let room: Room = raw.parse()?;
        authorize_room(services, principal, room)?;
        rooms.insert(room);
    }
    Ok(rooms)
}

fn authorize_room(
    services: &AppServices,
    principal: &PrincipalContext,
    room: Room,
) -> ApiResult<()> {
    if principal.is_admin() {
        return Ok(());
    }
    let allowed = match room {
        Room::User(id) => id == principal.user_id(),
        Room::Order(id) => visible_order(services, principal, id).is_ok(),
        Room::Restaurant(id) => services
            .read()
            .restaurants
            .get(id)
            .is_some_and(|r| r.owner_id == principal.user_id()),
        Room::Deliveries => principal.role() == Role::Livreur,
    };
    if allowed {
        Ok(())
    } else {
        Err(ApiError::forbidden(format!("not allowed to join room {room}")))
    }
}
