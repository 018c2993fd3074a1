use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use miam_core::{Address, DeliveryId, Money, OrderId, RestaurantId, UserId};
use miam_delivery::{DELIVERY_AGGREGATE, DeliveryEvent, DeliveryStatus, DeliveryStatusChanged};
use miam_events::{EventEnvelope, Projection, ProjectionError, StreamCursors};

use crate::read_model::{InMemoryStore, KeyedStore};

/// Courier-facing delivery job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryView {
    pub delivery_id: DeliveryId,
    pub order_id: OrderId,
    pub restaurant_id: RestaurantId,
    pub client_id: UserId,
    pub courier_id: Option<UserId>,
    pub pickup: Address,
    pub dropoff: Address,
    pub distance_m: u32,
    pub delivery_fee: Money,
    pub courier_earning: Money,
    pub tip: Money,
    pub status: DeliveryStatus,
    pub ready_for_pickup: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct DeliveriesProjection<S = InMemoryStore<DeliveryId, DeliveryView>> {
    store: S,
    cursors: StreamCursors,
}

impl DeliveriesProjection {
    pub fn in_memory() -> Self {
        Self::new(InMemoryStore::new())
    }
}

impl<S> DeliveriesProjection<S>
where
    S: KeyedStore<DeliveryId, DeliveryView>,
{
    pub fn new(store: S) -> Self {
        Self { store, cursors: StreamCursors::new() }
    }

    pub fn get(&self, id: DeliveryId) -> Option<DeliveryView> {
        self.store.get(&id)
    }

    /// Open jobs, oldest first.
    pub fn available(&self) -> Vec<DeliveryView> {
        let mut out: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|d| d.status == DeliveryStatus::Available)
            .collect();
        out.sort_by_key(|d| (d.created_at, d.delivery_id));
        out
    }

    /// Newest first.
    pub fn for_courier(&self, courier_id: UserId) -> Vec<DeliveryView> {
        let mut out: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|d| d.courier_id == Some(courier_id))
            .collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        out
    }

    fn touch(
        &self,
        e: &DeliveryStatusChanged,
        f: impl FnOnce(&mut DeliveryView),
    ) -> Result<(), ProjectionError> {
        let found = self.store.update(&e.delivery_id, |view| {
            f(view);
            view.updated_at = e.occurred_at;
        });
        if found {
            Ok(())
        } else {
            Err(ProjectionError::Inconsistent(format!(
                "delivery {} was never created",
                e.delivery_id
            )))
        }
    }
}

impl<S> Projection for DeliveriesProjection<S>
where
    S: KeyedStore<DeliveryId, DeliveryView>,
{
    fn name(&self) -> &'static str {
        "deliveries"
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != DELIVERY_AGGREGATE || !self.cursors.should_apply(envelope)?
        {
            return Ok(());
        }
        let event: DeliveryEvent =
            envelope.decode().map_err(|e| ProjectionError::deserialize(envelope, e))?;

        match event {
            DeliveryEvent::Created(e) => self.store.upsert(
                e.delivery_id,
                DeliveryView {
                    delivery_id: e.delivery_id,
                    order_id: e.order_id,
                    restaurant_id: e.restaurant_id,
                    client_id: e.client_id,
                    courier_id: None,
                    pickup: e.pickup,
                    dropoff: e.dropoff,
                    distance_m: e.distance_m,
                    delivery_fee: e.delivery_fee,
                    courier_earning: e.courier_earning,
                    tip: e.tip,
                    status: DeliveryStatus::Available,
                    ready_for_pickup: false,
                    created_at: e.occurred_at,
                    updated_at: e.occurred_at,
                },
            ),
            DeliveryEvent::ReadyForPickup(e) => self.touch(&e, |v| v.ready_for_pickup = true)?,
            DeliveryEvent::Accepted(e) => self.touch(&e, |v| {
                v.status = DeliveryStatus::Accepted;
                v.courier_id = e.courier_id;
            })?,
            DeliveryEvent::Released(e) => self.touch(&e, |v| {
                v.status = DeliveryStatus::Available;
                v.courier_id = None;
            })?,
            DeliveryEvent::PickedUp(e) => self.touch(&e, |v| v.status = DeliveryStatus::PickedUp)?,
            DeliveryEvent::Cancelled(e) => {
                self.touch(&e, |v| v.status = DeliveryStatus::Cancelled)?
            }
            DeliveryEvent::Delivered(e) => {
                let found = self.store.update(&e.delivery_id, |v| {
                    v.status = DeliveryStatus::Delivered;
                    v.courier_id = Some(e.courier_id);
                    v.updated_at = e.occurred_at;
                });
                if !found {
                    return Err(ProjectionError::Inconsistent(format!(
                        "delivery {} was never created",
                        e.delivery_id
                    )));
                }
            }
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    fn reset(&self) {
        self.store.clear();
        self.cursors.clear();
    }
}
