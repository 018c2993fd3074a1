//! Room-based realtime fan-out.
//!
//! One broadcast channel carries every message; subscribers filter on the
//! rooms they joined. Delivery is at-most-once: a lagging receiver loses
//! messages and is expected to refetch.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use miam_core::{DomainError, OrderId, RestaurantId, UserId};
use miam_delivery::{DELIVERY_AGGREGATE, DeliveryEvent};
use miam_events::EventEnvelope;
use miam_notifications::{INBOX_AGGREGATE, InboxEvent};
use miam_ordering::{CHAT_AGGREGATE, ORDER_AGGREGATE, OrderChatEvent, OrderEvent};

pub const ORDER_UPDATE: &str = "order:update";
pub const DELIVERY_UPDATE: &str = "delivery:update";
pub const CHAT_MESSAGE: &str = "chat:message";
pub const NOTIFICATION_NEW: &str = "notification:new";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    User(UserId),
    Order(OrderId),
    Restaurant(RestaurantId),
    /// Open jobs board shared by all couriers.
    Deliveries,
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::User(id) => write!(f, "user:{id}"),
            Room::Order(id) => write!(f, "order:{id}"),
            Room::Restaurant(id) => write!(f, "restaurant:{id}"),
            Room::Deliveries => f.write_str("deliveries"),
        }
    }
}

impl FromStr for Room {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "deliveries" {
            return Ok(Room::Deliveries);
        }
        match s.split_once(':') {
            Some(("user", id)) => Ok(Room::User(id.parse()?)),
            Some(("order", id)) => Ok(Room::Order(id.parse()?)),
            Some(("restaurant", id)) => Ok(Room::Restaurant(id.parse()?)),
            _ => Err(DomainError::validation(format!("unknown room `{s}`"))),
        }
    }
}

impl Serialize for Room {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RealtimeMessage {
    pub room: Room,
    pub event: &'static str,
    pub data: JsonValue,
}

#[derive(Debug, Clone)]
pub struct RealtimeHub {
    sender: broadcast::Sender<RealtimeMessage>,
}

impl RealtimeHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeMessage> {
        self.sender.subscribe()
    }

    pub fn publish(&self, message: RealtimeMessage) {
        // No listener is not an error.
        if self.sender.send(message).is_err() {
            debug!("realtime message dropped, no subscribers");
        }
    }

    /// Fan one committed event out to every room it concerns.
    pub fn broadcast_envelope(&self, envelope: &EventEnvelope<JsonValue>) {
        for message in route(envelope) {
            self.publish(message);
        }
    }
}

/// Rooms and event names for one envelope. Streams nobody watches yield nothing.
pub fn route(envelope: &EventEnvelope<JsonValue>) -> Vec<RealtimeMessage> {
    let routed = match envelope.aggregate_type() {
        ORDER_AGGREGATE => envelope.decode().map(|e| (ORDER_UPDATE, order_rooms(&e))),
        DELIVERY_AGGREGATE => envelope.decode().map(|e| (DELIVERY_UPDATE, delivery_rooms(&e))),
        CHAT_AGGREGATE => envelope.decode().map(|e| (CHAT_MESSAGE, chat_rooms(&e))),
        INBOX_AGGREGATE => envelope.decode().map(|e| (NOTIFICATION_NEW, inbox_rooms(&e))),
        _ => return vec![],
    };
    let (event, rooms) = match routed {
        Ok(routed) => routed,
        Err(err) => {
            warn!(event_type = envelope.event_type(), error = %err, "realtime routing skipped");
            return vec![];
        }
    };

    let data = json!({
        "type": envelope.event_type(),
        "aggregate_id": envelope.aggregate_id().to_string(),
        "sequence": envelope.sequence_number(),
        "occurred_at": envelope.occurred_at(),
        "payload": envelope.payload(),
    });
    rooms.into_iter().map(|room| RealtimeMessage { room, event, data: data.clone() }).collect()
}

fn order_rooms(event: &OrderEvent) -> Vec<Room> {
    let parties = event.parties();
    let mut rooms = vec![
        Room::Order(event.order_id()),
        Room::User(parties.client_id),
        Room::User(parties.owner_id),
        Room::Restaurant(parties.restaurant_id),
    ];
    rooms.extend(parties.courier_id.map(Room::User));
    rooms
}

fn delivery_rooms(event: &DeliveryEvent) -> Vec<Room> {
    let courier = match event {
        DeliveryEvent::Created(_) => None,
        DeliveryEvent::Delivered(e) => Some(e.courier_id),
        DeliveryEvent::ReadyForPickup(e)
        | DeliveryEvent::Accepted(e)
        | DeliveryEvent::Released(e)
        | DeliveryEvent::PickedUp(e)
        | DeliveryEvent::Cancelled(e) => e.courier_id,
    };
    let mut rooms = vec![Room::Deliveries, Room::Order(event.order_id())];
    rooms.extend(courier.map(Room::User));
    rooms
}

fn chat_rooms(event: &OrderChatEvent) -> Vec<Room> {
    match event {
        OrderChatEvent::MessagePosted(e) => vec![Room::Order(e.order_id)],
    }
}

/// Only new notifications are pushed; read receipts stay local.
fn inbox_rooms(event: &InboxEvent) -> Vec<Room> {
    match event {
        InboxEvent::Delivered(_) => vec![Room::User(event.recipient_id())],
        InboxEvent::Read(_) | InboxEvent::AllRead(_) => vec![],
    }
}
