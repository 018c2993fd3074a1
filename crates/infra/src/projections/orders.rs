use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use miam_core::{Money, OrderId, PaymentId, RestaurantId, UserId};
use miam_events::{EventEnvelope, Projection, ProjectionError, StreamCursors};
use miam_ordering::{
    DeliveryTerms, ORDER_AGGREGATE, OrderEvent, OrderLine, OrderParties, OrderStatus,
    PaymentMethod, PaymentStatus,
};

use crate::read_model::{InMemoryStore, KeyedStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderView {
    pub order_id: OrderId,
    pub client_id: UserId,
    pub restaurant_id: RestaurantId,
    pub owner_id: UserId,
    pub courier_id: Option<UserId>,
    pub lines: Vec<OrderLine>,
    pub subtotal: Money,
    pub delivery: DeliveryTerms,
    pub total: Money,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub payment_id: Option<PaymentId>,
    pub status: OrderStatus,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub placed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderView {
    pub fn involves(&self, user_id: UserId) -> bool {
        self.client_id == user_id || self.owner_id == user_id || self.courier_id == Some(user_id)
    }
}

/// Which orders a caller may list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderScope {
    Client(UserId),
    /// Orders of every restaurant the user owns.
    Owner(UserId),
    Courier(UserId),
    All,
}

impl OrderScope {
    fn admits(self, order: &OrderView) -> bool {
        match self {
            OrderScope::Client(id) => order.client_id == id,
            OrderScope::Owner(id) => order.owner_id == id,
            OrderScope::Courier(id) => order.courier_id == Some(id),
            OrderScope::All => true,
        }
    }
}

/// Platform totals for the admin dashboard. Sums cover delivered orders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStats {
    pub total_orders: u64,
    pub by_status: BTreeMap<String, u64>,
    pub delivered_subtotal: Money,
    pub delivered_fees: Money,
    pub delivered_tips: Money,
    pub delivered_total: Money,
}

pub struct OrdersProjection<S = InMemoryStore<OrderId, OrderView>> {
    store: S,
    cursors: StreamCursors,
}

impl OrdersProjection {
    pub fn in_memory() -> Self {
        Self::new(InMemoryStore::new())
    }
}

impl<S> OrdersProjection<S>
where
    S: KeyedStore<OrderId, OrderView>,
{
    pub fn new(store: S) -> Self {
        Self { store, cursors: StreamCursors::new() }
    }

    pub fn get(&self, id: OrderId) -> Option<OrderView> {
        self.store.get(&id)
    }

    /// Newest first.
    pub fn list(&self, scope: OrderScope, status: Option<OrderStatus>) -> Vec<OrderView> {
        let mut out: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|o| scope.admits(o))
            .filter(|o| status.is_none_or(|s| o.status == s))
            .collect();
        out.sort_by(|a, b| b.placed_at.cmp(&a.placed_at).then(b.order_id.cmp(&a.order_id)));
        out
    }

    /// Delivered orders per restaurant, the popularity signal.
    pub fn delivered_by_restaurant(&self) -> HashMap<RestaurantId, u32> {
        let mut counts = HashMap::new();
        for o in self.store.list() {
            if o.status == OrderStatus::Delivered {
                *counts.entry(o.restaurant_id).or_default() += 1;
            }
        }
        counts
    }

    pub fn stats(&self) -> OrderStats {
        let mut stats = OrderStats::default();
        for o in self.store.list() {
            stats.total_orders += 1;
            *stats.by_status.entry(o.status.as_str().to_string()).or_default() += 1;
            if o.status == OrderStatus::Delivered {
                stats.delivered_subtotal = stats.delivered_subtotal + o.subtotal;
                stats.delivered_fees = stats.delivered_fees + o.delivery.delivery_fee;
                stats.delivered_tips = stats.delivered_tips + o.delivery.tip;
                stats.delivered_total = stats.delivered_total + o.total;
            }
        }
        stats
    }

    fn touch(
        &self,
        id: OrderId,
        parties: &OrderParties,
        at: DateTime<Utc>,
        f: impl FnOnce(&mut OrderView),
    ) -> Result<(), ProjectionError> {
        let found = self.store.update(&id, |view| {
            view.courier_id = parties.courier_id;
            f(view);
            view.updated_at = at;
        });
        if found {
            Ok(())
        } else {
            Err(ProjectionError::Inconsistent(format!("order {id} was never placed")))
        }
    }

    fn set_status(
        &self,
        id: OrderId,
        parties: &OrderParties,
        at: DateTime<Utc>,
        status: OrderStatus,
    ) -> Result<(), ProjectionError> {
        self.touch(id, parties, at, |v| v.status = status)
    }
}

impl<S> Projection for OrdersProjection<S>
where
    S: KeyedStore<OrderId, OrderView>,
{
    fn name(&self) -> &'static str {
        "orders"
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != ORDER_AGGREGATE || !self.cursors.should_apply(envelope)? {
            return Ok(());
        }
        let event: OrderEvent =
            envelope.decode().map_err(|e| ProjectionError::deserialize(envelope, e))?;

        match event {
            OrderEvent::Placed(e) => {
                let view = OrderView {
                    order_id: e.order_id,
                    client_id: e.parties.client_id,
                    restaurant_id: e.parties.restaurant_id,
                    owner_id: e.parties.owner_id,
                    courier_id: e.parties.courier_id,
                    lines: e.lines,
                    subtotal: e.subtotal,
                    delivery: e.delivery,
                    total: e.total,
                    payment_method: e.payment_method,
                    payment_status: PaymentStatus::Unpaid,
                    payment_id: None,
                    status: OrderStatus::Pending,
                    notes: e.notes,
                    cancellation_reason: None,
                    placed_at: e.occurred_at,
                    updated_at: e.occurred_at,
                };
                self.store.upsert(e.order_id, view);
            }
            OrderEvent::Confirmed(e) => {
                self.set_status(e.order_id, &e.parties, e.occurred_at, OrderStatus::Confirmed)?
            }
            OrderEvent::PreparationStarted(e) => {
                self.set_status(e.order_id, &e.parties, e.occurred_at, OrderStatus::Preparing)?
            }
            OrderEvent::Ready(e) => {
                self.set_status(e.order_id, &e.parties, e.occurred_at, OrderStatus::Ready)?
            }
            OrderEvent::PickedUp(e) => {
                self.set_status(e.order_id, &e.parties, e.occurred_at, OrderStatus::PickedUp)?
            }
            OrderEvent::Delivered(e) => {
                self.set_status(e.order_id, &e.parties, e.occurred_at, OrderStatus::Delivered)?
            }
            OrderEvent::Cancelled(e) => self.touch(e.order_id, &e.parties, e.occurred_at, |v| {
                v.status = OrderStatus::Cancelled;
                v.cancellation_reason = e.reason;
            })?,
            OrderEvent::CourierAssigned(e) | OrderEvent::CourierCleared(e) => {
                self.touch(e.order_id, &e.parties, e.occurred_at, |_| {})?
            }
            OrderEvent::Paid(e) => self.touch(e.order_id, &e.parties, e.occurred_at, |v| {
                v.payment_status = PaymentStatus::Paid;
                v.payment_id = Some(e.payment_id);
            })?,
            OrderEvent::Refunded(e) => self.touch(e.order_id, &e.parties, e.occurred_at, |v| {
                v.payment_status = PaymentStatus::Refunded;
            })?,
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    fn reset(&self) {
        self.store.clear();
        self.cursors.clear();
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use miam_core::{Address, GeoPoint, MenuItemId};
    use miam_ordering::{CourierChanged, OrderPlaced, OrderStatusChanged};

    use super::*;
    use crate::projections::test_support::envelope;

    fn address() -> Address {
        Address {
            street: "Rue 10".into(),
            city: "Dakar".into(),
            postal_code: None,
            location: Some(GeoPoint { lat: 14.7, lng: -17.45 }),
        }
    }

    fn placed(order_id: OrderId, parties: OrderParties) -> OrderEvent {
        OrderEvent::Placed(OrderPlaced {
            order_id,
            parties,
            lines: vec![OrderLine {
                item_id: MenuItemId::new(),
                name: "Yassa".into(),
                unit_price: Money::from_cents(1_000),
                quantity: 2,
                line_total: Money::from_cents(2_000),
            }],
            subtotal: Money::from_cents(2_000),
            delivery: DeliveryTerms {
                pickup: address(),
                dropoff: address(),
                distance_m: 1_000,
                delivery_fee: Money::from_cents(310),
                courier_earning: Money::from_cents(248),
                tip: Money::from_cents(100),
            },
            total: Money::from_cents(2_410),
            payment_method: PaymentMethod::Cash,
            notes: None,
            occurred_at: Utc::now(),
        })
    }

    fn parties() -> OrderParties {
        OrderParties {
            client_id: UserId::new(),
            restaurant_id: RestaurantId::new(),
            owner_id: UserId::new(),
            courier_id: None,
        }
    }

    #[test]
    fn scopes_follow_parties_and_courier_assignment() {
        let p = OrdersProjection::in_memory();
        let id = OrderId::new();
        let mut who = parties();
        p.apply_envelope(&envelope(ORDER_AGGREGATE, id.into(), 1, &placed(id, who))).unwrap();
        let other = OrderId::new();
        p.apply_envelope(&envelope(ORDER_AGGREGATE, other.into(), 1, &placed(other, parties())))
            .unwrap();

        let courier = UserId::new();
        who.courier_id = Some(courier);
        let assigned = OrderEvent::CourierAssigned(CourierChanged {
            order_id: id,
            parties: who,
            occurred_at: Utc::now(),
        });
        p.apply_envelope(&envelope(ORDER_AGGREGATE, id.into(), 2, &assigned)).unwrap();

        assert_eq!(p.list(OrderScope::Client(who.client_id), None).len(), 1);
        assert_eq!(p.list(OrderScope::Owner(who.owner_id), None).len(), 1);
        assert_eq!(p.list(OrderScope::Courier(courier), None).len(), 1);
        assert!(p.list(OrderScope::Courier(UserId::new()), None).is_empty());
        assert!(p.get(id).unwrap().involves(courier));
    }

    #[test]
    fn stats_count_statuses_and_delivered_money() {
        let p = OrdersProjection::in_memory();
        let id = OrderId::new();
        let who = parties();
        let at = Utc::now();
        let changed = |order_id| OrderStatusChanged { order_id, parties: who, occurred_at: at };
        let events = [
            placed(id, who),
            OrderEvent::Confirmed(changed(id)),
            OrderEvent::PreparationStarted(changed(id)),
            OrderEvent::Ready(changed(id)),
            OrderEvent::PickedUp(changed(id)),
            OrderEvent::Delivered(changed(id)),
        ];
        for (i, ev) in events.iter().enumerate() {
            p.apply_envelope(&envelope(ORDER_AGGREGATE, id.into(), i as u64 + 1, ev)).unwrap();
        }

        let stats = p.stats();
        assert_eq!(stats.total_orders, 1);
        assert_eq!(stats.by_status.get("delivered"), Some(&1));
        assert_eq!(stats.delivered_total, Money::from_cents(2_410));
        assert_eq!(p.delivered_by_restaurant().get(&who.restaurant_id), Some(&1));
    }

    #[test]
    fn status_change_for_unknown_order_is_inconsistent() {
        let p = OrdersProjection::in_memory();
        let id = OrderId::new();
        let ev = OrderEvent::Confirmed(OrderStatusChanged {
            order_id: id,
            parties: parties(),
            occurred_at: Utc::now(),
        });
        let err = p.apply_envelope(&envelope(ORDER_AGGREGATE, id.into(), 1, &ev)).unwrap_err();
        assert!(matches!(err, ProjectionError::Inconsistent(_)));
    }
}
