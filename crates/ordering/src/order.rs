use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use miam_core::{
    Actor, Address, Aggregate, AggregateRoot, DomainError, DomainResult, Money, OrderId, PaymentId,
    RestaurantId, UserId,
};
use miam_events::Event;

use crate::pricing::{MAX_LINES, MAX_QUANTITY, OrderLine, order_total};

pub const ORDER_AGGREGATE: &str = "ordering.order";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Ready,
    PickedUp,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::PickedUp => "picked_up",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Paid,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    MobileMoney,
    Cash,
}

impl PaymentMethod {
    /// Charged through the gateway up front; cash is settled on delivery.
    pub fn is_online(self) -> bool {
        !matches!(self, PaymentMethod::Cash)
    }
}

/// Delivery leg agreed at placement, quoted by the earnings policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryTerms {
    pub pickup: Address,
    pub dropoff: Address,
    pub distance_m: u32,
    pub delivery_fee: Money,
    pub courier_earning: Money,
    pub tip: Money,
}

/// Everyone an order event concerns; carried on every event for routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderParties {
    pub client_id: UserId,
    pub restaurant_id: RestaurantId,
    pub owner_id: UserId,
    pub courier_id: Option<UserId>,
}

impl OrderParties {
    pub fn involves(&self, user_id: UserId) -> bool {
        self.client_id == user_id || self.owner_id == user_id || self.courier_id == Some(user_id)
    }
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    id: OrderId,
    parties: Option<OrderParties>,
    lines: Vec<OrderLine>,
    subtotal: Money,
    terms: Option<DeliveryTerms>,
    total: Money,
    payment_method: PaymentMethod,
    payment_status: PaymentStatus,
    payment_id: Option<PaymentId>,
    status: OrderStatus,
    version: u64,
    created: bool,
}

impl Order {
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            parties: None,
            lines: Vec::new(),
            subtotal: Money::ZERO,
            terms: None,
            total: Money::ZERO,
            payment_method: PaymentMethod::Card,
            payment_status: PaymentStatus::Unpaid,
            payment_id: None,
            status: OrderStatus::Pending,
            version: 0,
            created: false,
        }
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    pub fn payment_id(&self) -> Option<PaymentId> {
        self.payment_id
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn terms(&self) -> Option<&DeliveryTerms> {
        self.terms.as_ref()
    }

    pub fn parties(&self) -> Option<&OrderParties> {
        self.parties.as_ref()
    }

    /// Client, restaurant owner, assigned courier, or an admin.
    pub fn ensure_participant(&self, actor: &Actor) -> DomainResult<()> {
        let parties = self.require_parties()?;
        if actor.is_admin || parties.involves(actor.user_id) {
            Ok(())
        } else {
            Err(DomainError::unauthorized())
        }
    }

    fn require_parties(&self) -> DomainResult<OrderParties> {
        match (self.created, self.parties) {
            (true, Some(p)) => Ok(p),
            _ => Err(DomainError::NotFound),
        }
    }

    fn ensure_owner(&self, actor: &Actor) -> DomainResult<OrderParties> {
        let parties = self.require_parties()?;
        actor.ensure_owner_or_admin(parties.owner_id)?;
        Ok(parties)
    }

    fn ensure_status(&self, expected: OrderStatus, action: &str) -> DomainResult<()> {
        if self.status != expected {
            return Err(DomainError::invariant(format!(
                "cannot {action} an order that is {}",
                self.status.as_str()
            )));
        }
        Ok(())
    }

    fn status_changed(&self, parties: OrderParties, at: DateTime<Utc>) -> OrderStatusChanged {
        OrderStatusChanged { order_id: self.id, parties, occurred_at: at }
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Command: PlaceOrder. Lines are already priced against the menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub client_id: UserId,
    pub restaurant_id: RestaurantId,
    pub owner_id: UserId,
    pub lines: Vec<OrderLine>,
    pub delivery: DeliveryTerms,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Restaurant-side transition (confirm, prepare, ready).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTransition {
    pub order_id: OrderId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: OrderId,
    pub actor: Actor,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Fact relayed by the fulfillment policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSignal {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignCourier {
    pub order_id: OrderId,
    pub courier_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSignal {
    pub order_id: OrderId,
    pub payment_id: PaymentId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderCommand {
    Place(PlaceOrder),
    Confirm(OrderTransition),
    StartPreparing(OrderTransition),
    MarkReady(OrderTransition),
    Cancel(CancelOrder),
    MarkPickedUp(OrderSignal),
    MarkDelivered(OrderSignal),
    AssignCourier(AssignCourier),
    ClearCourier(OrderSignal),
    MarkPaid(PaymentSignal),
    MarkRefunded(PaymentSignal),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub parties: OrderParties,
    pub lines: Vec<OrderLine>,
    pub subtotal: Money,
    pub delivery: DeliveryTerms,
    pub total: Money,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChanged {
    pub order_id: OrderId,
    pub parties: OrderParties,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub parties: OrderParties,
    pub cancelled_by: UserId,
    pub reason: Option<String>,
    pub payment_status: PaymentStatus,
    pub payment_id: Option<PaymentId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourierChanged {
    pub order_id: OrderId,
    /// Parties after the change.
    pub parties: OrderParties,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaymentChanged {
    pub order_id: OrderId,
    pub parties: OrderParties,
    pub payment_id: PaymentId,
    /// The charge landed after the order was cancelled and must be returned.
    #[serde(default)]
    pub after_cancellation: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderEvent {
    Placed(OrderPlaced),
    Confirmed(OrderStatusChanged),
    PreparationStarted(OrderStatusChanged),
    Ready(OrderStatusChanged),
    PickedUp(OrderStatusChanged),
    Delivered(OrderStatusChanged),
    Cancelled(OrderCancelled),
    CourierAssigned(CourierChanged),
    CourierCleared(CourierChanged),
    Paid(OrderPaymentChanged),
    Refunded(OrderPaymentChanged),
}

impl OrderEvent {
    pub fn parties(&self) -> &OrderParties {
        match self {
            OrderEvent::Placed(e) => &e.parties,
            OrderEvent::Confirmed(e)
            | OrderEvent::PreparationStarted(e)
            | OrderEvent::Ready(e)
            | OrderEvent::PickedUp(e)
            | OrderEvent::Delivered(e) => &e.parties,
            OrderEvent::Cancelled(e) => &e.parties,
            OrderEvent::CourierAssigned(e) | OrderEvent::CourierCleared(e) => &e.parties,
            OrderEvent::Paid(e) | OrderEvent::Refunded(e) => &e.parties,
        }
    }

    pub fn order_id(&self) -> OrderId {
        match self {
            OrderEvent::Placed(e) => e.order_id,
            OrderEvent::Confirmed(e)
            | OrderEvent::PreparationStarted(e)
            | OrderEvent::Ready(e)
            | OrderEvent::PickedUp(e)
            | OrderEvent::Delivered(e) => e.order_id,
            OrderEvent::Cancelled(e) => e.order_id,
            OrderEvent::CourierAssigned(e) | OrderEvent::CourierCleared(e) => e.order_id,
            OrderEvent::Paid(e) | OrderEvent::Refunded(e) => e.order_id,
        }
    }
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Placed(_) => "ordering.order.placed",
            OrderEvent::Confirmed(_) => "ordering.order.confirmed",
            OrderEvent::PreparationStarted(_) => "ordering.order.preparing",
            OrderEvent::Ready(_) => "ordering.order.ready",
            OrderEvent::PickedUp(_) => "ordering.order.picked_up",
            OrderEvent::Delivered(_) => "ordering.order.delivered",
            OrderEvent::Cancelled(_) => "ordering.order.cancelled",
            OrderEvent::CourierAssigned(_) => "ordering.order.courier_assigned",
            OrderEvent::CourierCleared(_) => "ordering.order.courier_cleared",
            OrderEvent::Paid(_) => "ordering.order.paid",
            OrderEvent::Refunded(_) => "ordering.order.refunded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::Placed(e) => e.occurred_at,
            OrderEvent::Confirmed(e)
            | OrderEvent::PreparationStarted(e)
            | OrderEvent::Ready(e)
            | OrderEvent::PickedUp(e)
            | OrderEvent::Delivered(e) => e.occurred_at,
            OrderEvent::Cancelled(e) => e.occurred_at,
            OrderEvent::CourierAssigned(e) | OrderEvent::CourierCleared(e) => e.occurred_at,
            OrderEvent::Paid(e) | OrderEvent::Refunded(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::Placed(e) => {
                self.id = e.order_id;
                self.parties = Some(e.parties);
                self.lines = e.lines.clone();
                self.subtotal = e.subtotal;
                self.terms = Some(e.delivery.clone());
                self.total = e.total;
                self.payment_method = e.payment_method;
                self.payment_status = PaymentStatus::Unpaid;
                self.status = OrderStatus::Pending;
                self.created = true;
            }
            OrderEvent::Confirmed(_) => self.status = OrderStatus::Confirmed,
            OrderEvent::PreparationStarted(_) => self.status = OrderStatus::Preparing,
            OrderEvent::Ready(_) => self.status = OrderStatus::Ready,
            OrderEvent::PickedUp(_) => self.status = OrderStatus::PickedUp,
            OrderEvent::Delivered(_) => self.status = OrderStatus::Delivered,
            OrderEvent::Cancelled(_) => self.status = OrderStatus::Cancelled,
            OrderEvent::CourierAssigned(e) | OrderEvent::CourierCleared(e) => {
                self.parties = Some(e.parties);
            }
            OrderEvent::Paid(e) => {
                self.payment_status = PaymentStatus::Paid;
                self.payment_id = Some(e.payment_id);
            }
            OrderEvent::Refunded(_) => self.payment_status = PaymentStatus::Refunded,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::Place(cmd) => self.handle_place(cmd),
            OrderCommand::Confirm(cmd) => {
                let parties = self.ensure_owner(&cmd.actor)?;
                self.ensure_status(OrderStatus::Pending, "confirm")?;
                if self.payment_method.is_online() && self.payment_status != PaymentStatus::Paid {
                    return Err(DomainError::invariant("order must be paid before confirmation"));
                }
                Ok(vec![OrderEvent::Confirmed(self.status_changed(parties, cmd.occurred_at))])
            }
            OrderCommand::StartPreparing(cmd) => {
                let parties = self.ensure_owner(&cmd.actor)?;
                self.ensure_status(OrderStatus::Confirmed, "start preparing")?;
                Ok(vec![OrderEvent::PreparationStarted(
                    self.status_changed(parties, cmd.occurred_at),
                )])
            }
            OrderCommand::MarkReady(cmd) => {
                let parties = self.ensure_owner(&cmd.actor)?;
                self.ensure_status(OrderStatus::Preparing, "mark ready")?;
                Ok(vec![OrderEvent::Ready(self.status_changed(parties, cmd.occurred_at))])
            }
            OrderCommand::Cancel(cmd) => self.handle_cancel(cmd),
            OrderCommand::MarkPickedUp(cmd) => {
                let parties = self.require_parties()?;
                if self.status == OrderStatus::PickedUp {
                    return Ok(vec![]);
                }
                self.ensure_status(OrderStatus::Ready, "pick up")?;
                Ok(vec![OrderEvent::PickedUp(self.status_changed(parties, cmd.occurred_at))])
            }
            OrderCommand::MarkDelivered(cmd) => {
                let parties = self.require_parties()?;
                if self.status == OrderStatus::Delivered {
                    return Ok(vec![]);
                }
                self.ensure_status(OrderStatus::PickedUp, "deliver")?;
                Ok(vec![OrderEvent::Delivered(self.status_changed(parties, cmd.occurred_at))])
            }
            OrderCommand::AssignCourier(cmd) => {
                let parties = self.require_parties()?;
                if parties.courier_id == Some(cmd.courier_id) {
                    return Ok(vec![]);
                }
                if self.status.is_terminal() {
                    return Err(DomainError::invariant("order is closed"));
                }
                Ok(vec![OrderEvent::CourierAssigned(CourierChanged {
                    order_id: self.id,
                    parties: OrderParties { courier_id: Some(cmd.courier_id), ..parties },
                    occurred_at: cmd.occurred_at,
                })])
            }
            OrderCommand::ClearCourier(cmd) => {
                let parties = self.require_parties()?;
                if parties.courier_id.is_none() {
                    return Ok(vec![]);
                }
                if matches!(self.status, OrderStatus::PickedUp | OrderStatus::Delivered) {
                    return Err(DomainError::invariant("courier already has the order"));
                }
                Ok(vec![OrderEvent::CourierCleared(CourierChanged {
                    order_id: self.id,
                    parties: OrderParties { courier_id: None, ..parties },
                    occurred_at: cmd.occurred_at,
                })])
            }
            OrderCommand::MarkPaid(cmd) => {
                let parties = self.require_parties()?;
                match self.payment_status {
                    PaymentStatus::Paid if self.payment_id == Some(cmd.payment_id) => Ok(vec![]),
                    PaymentStatus::Unpaid => Ok(vec![OrderEvent::Paid(OrderPaymentChanged {
                        order_id: self.id,
                        parties,
                        payment_id: cmd.payment_id,
                        after_cancellation: self.status == OrderStatus::Cancelled,
                        occurred_at: cmd.occurred_at,
                    })]),
                    _ => Err(DomainError::conflict("order payment already settled")),
                }
            }
            OrderCommand::MarkRefunded(cmd) => {
                let parties = self.require_parties()?;
                match self.payment_status {
                    PaymentStatus::Refunded => Ok(vec![]),
                    PaymentStatus::Paid => Ok(vec![OrderEvent::Refunded(OrderPaymentChanged {
                        order_id: self.id,
                        parties,
                        payment_id: cmd.payment_id,
                        after_cancellation: false,
                        occurred_at: cmd.occurred_at,
                    })]),
                    PaymentStatus::Unpaid => Err(DomainError::invariant("order was never paid")),
                }
            }
        }
    }
}

impl Order {
    fn handle_place(&self, cmd: &PlaceOrder) -> DomainResult<Vec<OrderEvent>> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }
        if cmd.lines.is_empty() || cmd.lines.len() > MAX_LINES {
            return Err(DomainError::validation(format!(
                "an order needs between 1 and {MAX_LINES} lines"
            )));
        }
        for line in &cmd.lines {
            if line.quantity == 0 || line.quantity > MAX_QUANTITY {
                return Err(DomainError::validation(format!(
                    "quantity must be within 1..={MAX_QUANTITY}"
                )));
            }
            if line.unit_price.times(line.quantity)? != line.line_total {
                return Err(DomainError::validation("line total does not match unit price"));
            }
        }
        if cmd.client_id == cmd.owner_id {
            return Err(DomainError::invariant("restaurateurs cannot order from themselves"));
        }

        let subtotal = cmd
            .lines
            .iter()
            .try_fold(Money::ZERO, |acc, l| acc.checked_add(l.line_total))?;
        let total = order_total(subtotal, cmd.delivery.delivery_fee, cmd.delivery.tip)?;
        cmd.delivery.dropoff.require_location()?;

        Ok(vec![OrderEvent::Placed(OrderPlaced {
            order_id: cmd.order_id,
            parties: OrderParties {
                client_id: cmd.client_id,
                restaurant_id: cmd.restaurant_id,
                owner_id: cmd.owner_id,
                courier_id: None,
            },
            lines: cmd.lines.clone(),
            subtotal,
            delivery: cmd.delivery.clone(),
            total,
            payment_method: cmd.payment_method,
            notes: cmd
                .notes
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            occurred_at: cmd.occurred_at,
        })])
    }

    /// Client while pending; owner while pending or confirmed; admin until pickup.
    fn handle_cancel(&self, cmd: &CancelOrder) -> DomainResult<Vec<OrderEvent>> {
        let parties = self.require_parties()?;
        if self.status.is_terminal() {
            return Err(DomainError::invariant(format!(
                "order is already {}",
                self.status.as_str()
            )));
        }

        let allowed = if cmd.actor.is_admin {
            !matches!(self.status, OrderStatus::PickedUp)
        } else if cmd.actor.is(parties.owner_id) {
            matches!(self.status, OrderStatus::Pending | OrderStatus::Confirmed)
        } else if cmd.actor.is(parties.client_id) {
            self.status == OrderStatus::Pending
        } else {
            return Err(DomainError::unauthorized());
        };
        if !allowed {
            return Err(DomainError::invariant(format!(
                "an order that is {} can no longer be cancelled by this party",
                self.status.as_str()
            )));
        }

        Ok(vec![OrderEvent::Cancelled(OrderCancelled {
            order_id: self.id,
            parties,
            cancelled_by: cmd.actor.user_id,
            reason: cmd
                .reason
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
            payment_status: self.payment_status,
            payment_id: self.payment_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use miam_core::{GeoPoint, MenuItemId};
    use miam_events::execute;

    use super::*;

    struct World {
        id: OrderId,
        client: UserId,
        owner: UserId,
        order: Order,
    }

    impl World {
        fn run(&mut self, cmd: OrderCommand) -> Vec<OrderEvent> {
            execute(&mut self.order, &cmd).unwrap()
        }

        fn transition(&self, actor: Actor) -> OrderTransition {
            OrderTransition { order_id: self.id, actor, occurred_at: Utc::now() }
        }

        fn signal(&self) -> OrderSignal {
            OrderSignal { order_id: self.id, occurred_at: Utc::now() }
        }

        fn cancel(&self, actor: Actor) -> OrderCommand {
            OrderCommand::Cancel(CancelOrder {
                order_id: self.id,
                actor,
                reason: Some("changed my mind".into()),
                occurred_at: Utc::now(),
            })
        }

        fn pay(&mut self) -> PaymentId {
            let payment_id = PaymentId::new();
            self.run(OrderCommand::MarkPaid(PaymentSignal {
                order_id: self.id,
                payment_id,
                occurred_at: Utc::now(),
            }));
            payment_id
        }

        /// Owner walks the order to `ready`.
        fn kitchen_to_ready(&mut self) {
            let owner = Actor::user(self.owner);
            self.run(OrderCommand::Confirm(self.transition(owner)));
            self.run(OrderCommand::StartPreparing(self.transition(owner)));
            self.run(OrderCommand::MarkReady(self.transition(owner)));
        }
    }

    fn address(lat: f64, lng: f64) -> Address {
        Address {
            street: "Rue 10".into(),
            city: "Dakar".into(),
            postal_code: None,
            location: Some(GeoPoint { lat, lng }),
        }
    }

    fn place(method: PaymentMethod) -> World {
        let id = OrderId::new();
        let client = UserId::new();
        let owner = UserId::new();
        let mut order = Order::empty(id);
        let line = OrderLine {
            item_id: MenuItemId::new(),
            name: "Yassa poulet".into(),
            unit_price: Money::from_cents(1200),
            quantity: 2,
            line_total: Money::from_cents(2400),
        };
        execute(
            &mut order,
            &OrderCommand::Place(PlaceOrder {
                order_id: id,
                client_id: client,
                restaurant_id: RestaurantId::new(),
                owner_id: owner,
                lines: vec![line],
                delivery: DeliveryTerms {
                    pickup: address(14.69, -17.44),
                    dropoff: address(14.71, -17.46),
                    distance_m: 3100,
                    delivery_fee: Money::from_cents(436),
                    courier_earning: Money::from_cents(349),
                    tip: Money::from_cents(100),
                },
                payment_method: method,
                notes: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        World { id, client, owner, order }
    }

    #[test]
    fn placement_computes_total_with_fee_and_tip() {
        let w = place(PaymentMethod::Card);
        assert_eq!(w.order.subtotal(), Money::from_cents(2400));
        assert_eq!(w.order.total(), Money::from_cents(2400 + 436 + 100));
        assert_eq!(w.order.status(), OrderStatus::Pending);
    }

    #[test]
    fn card_orders_must_be_paid_before_confirmation() {
        let mut w = place(PaymentMethod::Card);
        let confirm = OrderCommand::Confirm(w.transition(Actor::user(w.owner)));
        assert!(matches!(w.order.handle(&confirm), Err(DomainError::InvariantViolation(_))));

        w.pay();
        w.run(confirm);
        assert_eq!(w.order.status(), OrderStatus::Confirmed);
    }

    #[test]
    fn cash_orders_confirm_unpaid() {
        let mut w = place(PaymentMethod::Cash);
        w.run(OrderCommand::Confirm(w.transition(Actor::user(w.owner))));
        assert_eq!(w.order.status(), OrderStatus::Confirmed);
    }

    #[test]
    fn only_the_owner_drives_the_kitchen() {
        let mut w = place(PaymentMethod::Cash);
        let by_client = OrderCommand::Confirm(w.transition(Actor::user(w.client)));
        assert_eq!(w.order.handle(&by_client), Err(DomainError::Unauthorized));

        w.kitchen_to_ready();
        assert_eq!(w.order.status(), OrderStatus::Ready);

        // Skipping back is refused.
        let again = OrderCommand::StartPreparing(w.transition(Actor::user(w.owner)));
        assert!(matches!(w.order.handle(&again), Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn client_cancels_only_while_pending() {
        let mut w = place(PaymentMethod::Cash);
        w.run(OrderCommand::Confirm(w.transition(Actor::user(w.owner))));

        assert!(matches!(
            w.order.handle(&w.cancel(Actor::user(w.client))),
            Err(DomainError::InvariantViolation(_))
        ));
        // The restaurant may still back out.
        let events = w.run(w.cancel(Actor::user(w.owner)));
        assert_eq!(w.order.status(), OrderStatus::Cancelled);
        assert!(matches!(&events[0], OrderEvent::Cancelled(c) if c.cancelled_by == w.owner));
    }

    #[test]
    fn strangers_cannot_cancel_and_terminal_orders_stay_put() {
        let mut w = place(PaymentMethod::Cash);
        assert_eq!(
            w.order.handle(&w.cancel(Actor::user(UserId::new()))),
            Err(DomainError::Unauthorized)
        );

        w.run(w.cancel(Actor::admin(UserId::new())));
        assert!(w.order.handle(&w.cancel(Actor::admin(UserId::new()))).is_err());
    }

    #[test]
    fn admin_cannot_cancel_after_pickup() {
        let mut w = place(PaymentMethod::Cash);
        w.kitchen_to_ready();
        w.run(OrderCommand::MarkPickedUp(w.signal()));
        assert!(w.order.handle(&w.cancel(Actor::admin(UserId::new()))).is_err());

        w.run(OrderCommand::MarkDelivered(w.signal()));
        assert_eq!(w.order.status(), OrderStatus::Delivered);
        // Redelivered signals are no-ops.
        assert!(w.order.handle(&OrderCommand::MarkDelivered(w.signal())).unwrap().is_empty());
    }

    #[test]
    fn cancellation_records_payment_for_refund() {
        let mut w = place(PaymentMethod::Card);
        let payment_id = w.pay();
        let events = w.order.handle(&w.cancel(Actor::user(w.client))).unwrap();
        match &events[0] {
            OrderEvent::Cancelled(c) => {
                assert_eq!(c.payment_status, PaymentStatus::Paid);
                assert_eq!(c.payment_id, Some(payment_id));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn courier_assignment_is_idempotent_and_extends_participants() {
        let mut w = place(PaymentMethod::Cash);
        let courier = UserId::new();
        let assign = OrderCommand::AssignCourier(AssignCourier {
            order_id: w.id,
            courier_id: courier,
            occurred_at: Utc::now(),
        });
        w.run(assign.clone());
        assert!(w.order.handle(&assign).unwrap().is_empty());
        assert!(w.order.ensure_participant(&Actor::user(courier)).is_ok());

        w.run(OrderCommand::ClearCourier(w.signal()));
        assert_eq!(
            w.order.ensure_participant(&Actor::user(courier)),
            Err(DomainError::Unauthorized)
        );
    }

    #[test]
    fn payment_landing_after_cancellation_is_flagged_for_refund() {
        let mut w = place(PaymentMethod::Card);
        w.run(w.cancel(Actor::user(w.client)));
        let payment_id = PaymentId::new();
        let events = w.run(OrderCommand::MarkPaid(PaymentSignal {
            order_id: w.id,
            payment_id,
            occurred_at: Utc::now(),
        }));
        match &events[0] {
            OrderEvent::Paid(p) => {
                assert!(p.after_cancellation);
                assert_eq!(p.payment_id, payment_id);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(w.order.status(), OrderStatus::Cancelled);
        assert_eq!(w.order.payment_status(), PaymentStatus::Paid);
    }

    #[test]
    fn mark_paid_twice_with_same_payment_is_a_no_op() {
        let mut w = place(PaymentMethod::Card);
        let payment_id = w.pay();
        let again = OrderCommand::MarkPaid(PaymentSignal {
            order_id: w.id,
            payment_id,
            occurred_at: Utc::now(),
        });
        assert!(w.order.handle(&again).unwrap().is_empty());
    }
}
