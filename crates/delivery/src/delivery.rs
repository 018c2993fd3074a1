use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use miam_core::{
    Address, Aggregate, AggregateRoot, DeliveryId, DomainError, DomainResult, Money, OrderId,
    RestaurantId, UserId,
};
use miam_events::Event;

pub const DELIVERY_AGGREGATE: &str = "delivery.delivery";

/// One delivery per order; the delivery stream reuses the order's uuid.
pub fn delivery_id_for(order_id: OrderId) -> DeliveryId {
    DeliveryId::from_uuid(*order_id.as_uuid())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Available,
    Accepted,
    PickedUp,
    Delivered,
    Cancelled,
}

impl DeliveryStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    id: DeliveryId,
    order_id: OrderId,
    restaurant_id: RestaurantId,
    client_id: UserId,
    pickup: Option<Address>,
    dropoff: Option<Address>,
    distance_m: u32,
    delivery_fee: Money,
    courier_earning: Money,
    tip: Money,
    courier_id: Option<UserId>,
    ready_for_pickup: bool,
    status: DeliveryStatus,
    version: u64,
    created: bool,
}

impl Delivery {
    pub fn empty(id: DeliveryId) -> Self {
        Self {
            id,
            order_id: OrderId::from_uuid(*id.as_uuid()),
            restaurant_id: RestaurantId::default(),
            client_id: UserId::default(),
            pickup: None,
            dropoff: None,
            distance_m: 0,
            delivery_fee: Money::ZERO,
            courier_earning: Money::ZERO,
            tip: Money::ZERO,
            courier_id: None,
            ready_for_pickup: false,
            status: DeliveryStatus::Available,
            version: 0,
            created: false,
        }
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn status(&self) -> DeliveryStatus {
        self.status
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn courier_id(&self) -> Option<UserId> {
        self.courier_id
    }

    pub fn is_ready_for_pickup(&self) -> bool {
        self.ready_for_pickup
    }

    /// What the courier takes home for this run.
    pub fn payout_due(&self) -> Money {
        self.courier_earning + self.tip
    }

    fn ensure_created(&self) -> DomainResult<()> {
        if !self.created {
            return Err(DomainError::NotFound);
        }
        Ok(())
    }

    fn ensure_assigned_to(&self, courier_id: UserId) -> DomainResult<()> {
        self.ensure_created()?;
        if self.courier_id != Some(courier_id) {
            return Err(DomainError::unauthorized());
        }
        Ok(())
    }

    fn changed(&self, courier_id: Option<UserId>, at: DateTime<Utc>) -> DeliveryStatusChanged {
        DeliveryStatusChanged {
            delivery_id: self.id,
            order_id: self.order_id,
            restaurant_id: self.restaurant_id,
            client_id: self.client_id,
            courier_id,
            occurred_at: at,
        }
    }
}

impl AggregateRoot for Delivery {
    type Id = DeliveryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateDelivery {
    pub delivery_id: DeliveryId,
    pub order_id: OrderId,
    pub restaurant_id: RestaurantId,
    pub client_id: UserId,
    pub pickup: Address,
    pub dropoff: Address,
    pub distance_m: u32,
    pub delivery_fee: Money,
    pub courier_earning: Money,
    pub tip: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkReadyForPickup {
    pub delivery_id: DeliveryId,
    pub occurred_at: DateTime<Utc>,
}

/// `courier_available` is the courier's current availability flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptDelivery {
    pub delivery_id: DeliveryId,
    pub courier_id: UserId,
    pub courier_available: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Release, pickup or completion by the assigned courier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourierAction {
    pub delivery_id: DeliveryId,
    pub courier_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelDelivery {
    pub delivery_id: DeliveryId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeliveryCommand {
    Create(CreateDelivery),
    MarkReadyForPickup(MarkReadyForPickup),
    Accept(AcceptDelivery),
    Release(CourierAction),
    PickUp(CourierAction),
    Complete(CourierAction),
    Cancel(CancelDelivery),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryCreated {
    pub delivery_id: DeliveryId,
    pub order_id: OrderId,
    pub restaurant_id: RestaurantId,
    pub client_id: UserId,
    pub pickup: Address,
    pub dropoff: Address,
    pub distance_m: u32,
    pub delivery_fee: Money,
    pub courier_earning: Money,
    pub tip: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStatusChanged {
    pub delivery_id: DeliveryId,
    pub order_id: OrderId,
    pub restaurant_id: RestaurantId,
    pub client_id: UserId,
    /// The courier concerned; for a release, the one who let go.
    pub courier_id: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryCompleted {
    pub delivery_id: DeliveryId,
    pub order_id: OrderId,
    pub restaurant_id: RestaurantId,
    pub client_id: UserId,
    pub courier_id: UserId,
    pub distance_m: u32,
    pub courier_earning: Money,
    pub tip: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeliveryEvent {
    Created(DeliveryCreated),
    ReadyForPickup(DeliveryStatusChanged),
    Accepted(DeliveryStatusChanged),
    Released(DeliveryStatusChanged),
    PickedUp(DeliveryStatusChanged),
    Delivered(DeliveryCompleted),
    Cancelled(DeliveryStatusChanged),
}

impl DeliveryEvent {
    pub fn order_id(&self) -> OrderId {
        match self {
            DeliveryEvent::Created(e) => e.order_id,
            DeliveryEvent::Delivered(e) => e.order_id,
            DeliveryEvent::ReadyForPickup(e)
            | DeliveryEvent::Accepted(e)
            | DeliveryEvent::Released(e)
            | DeliveryEvent::PickedUp(e)
            | DeliveryEvent::Cancelled(e) => e.order_id,
        }
    }
}

impl Event for DeliveryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DeliveryEvent::Created(_) => "delivery.delivery.created",
            DeliveryEvent::ReadyForPickup(_) => "delivery.delivery.ready_for_pickup",
            DeliveryEvent::Accepted(_) => "delivery.delivery.accepted",
            DeliveryEvent::Released(_) => "delivery.delivery.released",
            DeliveryEvent::PickedUp(_) => "delivery.delivery.picked_up",
            DeliveryEvent::Delivered(_) => "delivery.delivery.delivered",
            DeliveryEvent::Cancelled(_) => "delivery.delivery.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DeliveryEvent::Created(e) => e.occurred_at,
            DeliveryEvent::Delivered(e) => e.occurred_at,
            DeliveryEvent::ReadyForPickup(e)
            | DeliveryEvent::Accepted(e)
            | DeliveryEvent::Released(e)
            | DeliveryEvent::PickedUp(e)
            | DeliveryEvent::Cancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Delivery {
    type Command = DeliveryCommand;
    type Event = DeliveryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DeliveryEvent::Created(e) => {
                self.id = e.delivery_id;
                self.order_id = e.order_id;
                self.restaurant_id = e.restaurant_id;
                self.client_id = e.client_id;
                self.pickup = Some(e.pickup.clone());
                self.dropoff = Some(e.dropoff.clone());
                self.distance_m = e.distance_m;
                self.delivery_fee = e.delivery_fee;
                self.courier_earning = e.courier_earning;
                self.tip = e.tip;
                self.status = DeliveryStatus::Available;
                self.created = true;
            }
            DeliveryEvent::ReadyForPickup(_) => self.ready_for_pickup = true,
            DeliveryEvent::Accepted(e) => {
                self.status = DeliveryStatus::Accepted;
                self.courier_id = e.courier_id;
            }
            DeliveryEvent::Released(_) => {
                self.status = DeliveryStatus::Available;
                self.courier_id = None;
            }
            DeliveryEvent::PickedUp(_) => self.status = DeliveryStatus::PickedUp,
            DeliveryEvent::Delivered(_) => self.status = DeliveryStatus::Delivered,
            DeliveryEvent::Cancelled(_) => self.status = DeliveryStatus::Cancelled,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            DeliveryCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("delivery already exists"));
                }
                if cmd.delivery_fee.is_negative()
                    || cmd.courier_earning.is_negative()
                    || cmd.tip.is_negative()
                {
                    return Err(DomainError::validation("delivery amounts cannot be negative"));
                }
                if cmd.courier_earning > cmd.delivery_fee {
                    return Err(DomainError::validation("courier earning exceeds delivery fee"));
                }
                Ok(vec![DeliveryEvent::Created(DeliveryCreated {
                    delivery_id: cmd.delivery_id,
                    order_id: cmd.order_id,
                    restaurant_id: cmd.restaurant_id,
                    client_id: cmd.client_id,
                    pickup: cmd.pickup.clone(),
                    dropoff: cmd.dropoff.clone(),
                    distance_m: cmd.distance_m,
                    delivery_fee: cmd.delivery_fee,
                    courier_earning: cmd.courier_earning,
                    tip: cmd.tip,
                    occurred_at: cmd.occurred_at,
                })])
            }
            DeliveryCommand::MarkReadyForPickup(cmd) => {
                self.ensure_created()?;
                if self.ready_for_pickup || self.status.is_terminal() {
                    return Ok(vec![]);
                }
                Ok(vec![DeliveryEvent::ReadyForPickup(
                    self.changed(self.courier_id, cmd.occurred_at),
                )])
            }
            DeliveryCommand::Accept(cmd) => {
                self.ensure_created()?;
                if self.status != DeliveryStatus::Available {
                    return Err(DomainError::conflict("delivery is no longer available"));
                }
                if !cmd.courier_available {
                    return Err(DomainError::invariant(
                        "set yourself available before accepting deliveries",
                    ));
                }
                Ok(vec![DeliveryEvent::Accepted(
                    self.changed(Some(cmd.courier_id), cmd.occurred_at),
                )])
            }
            DeliveryCommand::Release(cmd) => {
                self.ensure_assigned_to(cmd.courier_id)?;
                if self.status != DeliveryStatus::Accepted {
                    return Err(DomainError::invariant("only accepted deliveries can be released"));
                }
                Ok(vec![DeliveryEvent::Released(
                    self.changed(Some(cmd.courier_id), cmd.occurred_at),
                )])
            }
            DeliveryCommand::PickUp(cmd) => {
                self.ensure_assigned_to(cmd.courier_id)?;
                if self.status != DeliveryStatus::Accepted {
                    return Err(DomainError::invariant("delivery must be accepted before pickup"));
                }
                if !self.ready_for_pickup {
                    return Err(DomainError::invariant("the order is not ready yet"));
                }
                Ok(vec![DeliveryEvent::PickedUp(
                    self.changed(Some(cmd.courier_id), cmd.occurred_at),
                )])
            }
            DeliveryCommand::Complete(cmd) => {
                self.ensure_assigned_to(cmd.courier_id)?;
                if self.status != DeliveryStatus::PickedUp {
                    return Err(DomainError::invariant("delivery must be picked up first"));
                }
                Ok(vec![DeliveryEvent::Delivered(DeliveryCompleted {
                    delivery_id: self.id,
                    order_id: self.order_id,
                    restaurant_id: self.restaurant_id,
                    client_id: self.client_id,
                    courier_id: cmd.courier_id,
                    distance_m: self.distance_m,
                    courier_earning: self.courier_earning,
                    tip: self.tip,
                    occurred_at: cmd.occurred_at,
                })])
            }
            DeliveryCommand::Cancel(cmd) => {
                self.ensure_created()?;
                match self.status {
                    DeliveryStatus::Cancelled => Ok(vec![]),
                    DeliveryStatus::Delivered => {
                        Err(DomainError::invariant("delivery already completed"))
                    }
                    _ => Ok(vec![DeliveryEvent::Cancelled(
                        self.changed(self.courier_id, cmd.occurred_at),
                    )]),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use miam_core::GeoPoint;
    use miam_events::execute;

    use super::*;

    struct Run {
        id: DeliveryId,
        delivery: Delivery,
    }

    impl Run {
        fn new() -> Self {
            let order_id = OrderId::new();
            let id = delivery_id_for(order_id);
            let mut delivery = Delivery::empty(id);
            let at = |lat, lng| Address {
                street: "Corniche Ouest".into(),
                city: "Dakar".into(),
                postal_code: None,
                location: Some(GeoPoint { lat, lng }),
            };
            execute(
                &mut delivery,
                &DeliveryCommand::Create(CreateDelivery {
                    delivery_id: id,
                    order_id,
                    restaurant_id: RestaurantId::new(),
                    client_id: UserId::new(),
                    pickup: at(14.69, -17.44),
                    dropoff: at(14.71, -17.46),
                    distance_m: 3_100,
                    delivery_fee: Money::from_cents(436),
                    courier_earning: Money::from_cents(349),
                    tip: Money::from_cents(100),
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap();
            Self { id, delivery }
        }

        fn run(&mut self, cmd: DeliveryCommand) -> DomainResult<Vec<DeliveryEvent>> {
            execute(&mut self.delivery, &cmd)
        }

        fn accept(&mut self, courier_id: UserId) -> DomainResult<Vec<DeliveryEvent>> {
            self.run(DeliveryCommand::Accept(AcceptDelivery {
                delivery_id: self.id,
                courier_id,
                courier_available: true,
                occurred_at: Utc::now(),
            }))
        }

        fn action(&self, courier_id: UserId) -> CourierAction {
            CourierAction { delivery_id: self.id, courier_id, occurred_at: Utc::now() }
        }

        fn ready(&mut self) {
            self.run(DeliveryCommand::MarkReadyForPickup(MarkReadyForPickup {
                delivery_id: self.id,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        }
    }

    #[test]
    fn delivery_shares_the_order_uuid() {
        let order_id = OrderId::new();
        assert_eq!(delivery_id_for(order_id).as_uuid(), order_id.as_uuid());

        let r = Run::new();
        assert_eq!(r.delivery.order_id().as_uuid(), r.id.as_uuid());
    }

    #[test]
    fn full_run_pays_earning_plus_tip() {
        let mut r = Run::new();
        let courier = UserId::new();
        r.accept(courier).unwrap();
        r.ready();
        r.run(DeliveryCommand::PickUp(r.action(courier))).unwrap();
        let events = r.run(DeliveryCommand::Complete(r.action(courier))).unwrap();

        assert_eq!(r.delivery.status(), DeliveryStatus::Delivered);
        match &events[0] {
            DeliveryEvent::Delivered(d) => {
                assert_eq!(d.courier_id, courier);
                assert_eq!(d.courier_earning + d.tip, Money::from_cents(449));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn only_one_courier_can_accept() {
        let mut r = Run::new();
        r.accept(UserId::new()).unwrap();
        assert!(matches!(r.accept(UserId::new()), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn unavailable_couriers_cannot_accept() {
        let r = Run::new();
        let cmd = DeliveryCommand::Accept(AcceptDelivery {
            delivery_id: r.id,
            courier_id: UserId::new(),
            courier_available: false,
            occurred_at: Utc::now(),
        });
        assert!(matches!(r.delivery.handle(&cmd), Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn pickup_waits_for_the_kitchen() {
        let mut r = Run::new();
        let courier = UserId::new();
        r.accept(courier).unwrap();
        assert!(matches!(
            r.run(DeliveryCommand::PickUp(r.action(courier))),
            Err(DomainError::InvariantViolation(_))
        ));
        r.ready();
        assert!(r.run(DeliveryCommand::PickUp(r.action(courier))).is_ok());
    }

    #[test]
    fn release_returns_the_job_to_the_pool() {
        let mut r = Run::new();
        let first = UserId::new();
        r.accept(first).unwrap();

        let stranger = UserId::new();
        assert_eq!(
            r.run(DeliveryCommand::Release(r.action(stranger))),
            Err(DomainError::Unauthorized)
        );

        r.run(DeliveryCommand::Release(r.action(first))).unwrap();
        assert_eq!(r.delivery.status(), DeliveryStatus::Available);
        assert_eq!(r.delivery.courier_id(), None);
        assert!(r.accept(UserId::new()).is_ok());
    }

    #[test]
    fn cancel_is_idempotent_but_not_after_delivery() {
        let mut r = Run::new();
        let cancel = DeliveryCommand::Cancel(CancelDelivery {
            delivery_id: r.id,
            reason: None,
            occurred_at: Utc::now(),
        });
        r.run(cancel.clone()).unwrap();
        assert!(r.run(cancel).unwrap().is_empty());
    }
}
