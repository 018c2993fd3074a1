//! Integration tests for the full pipeline.
//!
//! Command → EventStore → inline projections → EventBus → Reactor → follow-ups
//!
//! Verifies:
//! - an order walks from placement to delivery driven by courier actions
//! - the courier wallet is credited and cash is settled at the door
//! - cancelling a paid order refunds it through the gateway, even when the
//!   charge completes before the order has been marked paid
//! - realtime rooms receive the order updates

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use miam_catalog::{
        AddMenuItem, CreateRestaurant, OpenRestaurant, RESTAURANT_AGGREGATE, Restaurant,
        RestaurantCommand,
    };
    use miam_core::{
        Actor, Address, DeliveryId, GeoPoint, MenuItemId, Money, OrderId, PaymentId, RestaurantId,
        UserId,
    };
    use miam_delivery::{
        AcceptDelivery, CourierAction, CourierWallet, DELIVERY_AGGREGATE, Delivery,
        DeliveryCommand, DeliveryStatus, EarningsPolicy, WALLET_AGGREGATE, delivery_id_for,
    };
    use miam_notifications::{INBOX_AGGREGATE, Inbox, NotificationKind};
    use miam_ordering::{
        CancelOrder, DeliveryTerms, LineRequest, ORDER_AGGREGATE, Order, OrderCommand,
        OrderStatus, OrderTransition, PaymentMethod, PaymentStatus, PlaceOrder, price_lines,
    };
    use miam_payments::{
        CompletePayment, InitiatePayment, MockGateway, PAYMENT_AGGREGATE, Payment,
        PaymentCommand, PaymentState,
    };

    use crate::platform::Platform;
    use crate::reactor::Reactor;
    use crate::realtime::{ORDER_UPDATE, Room};

    struct World {
        platform: Platform,
        reactor: Reactor,
        owner: UserId,
        client: UserId,
        courier: UserId,
        restaurant_id: RestaurantId,
        item_id: MenuItemId,
    }

    fn address(lat: f64, lng: f64) -> Address {
        Address {
            street: "Rue Mohamed V".into(),
            city: "Dakar".into(),
            postal_code: None,
            location: Some(GeoPoint { lat, lng }),
        }
    }

    async fn world() -> World {
        let platform = Platform::in_memory();
        let reactor = platform.reactor(Arc::new(MockGateway::new()));
        let owner = UserId::new();
        let restaurant_id = RestaurantId::new();
        let item_id = MenuItemId::new();
        let now = Utc::now();

        let commands = [
            RestaurantCommand::Create(CreateRestaurant {
                restaurant_id,
                owner_id: owner,
                name: "Chez Fatou".into(),
                description: None,
                cuisine: "Senegalese".into(),
                address: address(14.6928, -17.4467),
                phone: None,
                prep_minutes: None,
                occurred_at: now,
            }),
            RestaurantCommand::AddMenuItem(AddMenuItem {
                restaurant_id,
                actor: Actor::user(owner),
                item_id,
                name: "Yassa poulet".into(),
                description: None,
                price: Money::from_cents(1_500),
                category: None,
                occurred_at: now,
            }),
            RestaurantCommand::Open(OpenRestaurant {
                restaurant_id,
                actor: Actor::user(owner),
                occurred_at: now,
            }),
        ];
        for cmd in commands {
            platform
                .dispatcher
                .dispatch(RESTAURANT_AGGREGATE, restaurant_id.into(), cmd, |id| {
                    Restaurant::empty(id.into())
                })
                .await
                .unwrap();
        }

        World {
            platform,
            reactor,
            owner,
            client: UserId::new(),
            courier: UserId::new(),
            restaurant_id,
            item_id,
        }
    }

    impl World {
        async fn place(&self, method: PaymentMethod, tip: Money) -> (OrderId, Money) {
            let restaurant: Restaurant = self
                .platform
                .dispatcher
                .load(RESTAURANT_AGGREGATE, self.restaurant_id.into(), |id| {
                    Restaurant::empty(id.into())
                })
                .await
                .unwrap();
            let priced =
                price_lines(&restaurant, &[LineRequest { item_id: self.item_id, quantity: 2 }])
                    .unwrap();

            let pickup = restaurant.address().unwrap().clone();
            let dropoff = address(14.7000, -17.4500);
            let distance_m = pickup
                .require_location()
                .unwrap()
                .distance_m(&dropoff.require_location().unwrap());
            let quote = EarningsPolicy::default().quote(distance_m).unwrap();

            let order_id = OrderId::new();
            let cmd = OrderCommand::Place(PlaceOrder {
                order_id,
                client_id: self.client,
                restaurant_id: self.restaurant_id,
                owner_id: self.owner,
                lines: priced.lines,
                delivery: DeliveryTerms {
                    pickup,
                    dropoff,
                    distance_m,
                    delivery_fee: quote.delivery_fee,
                    courier_earning: quote.courier_earning,
                    tip,
                },
                payment_method: method,
                notes: None,
                occurred_at: Utc::now(),
            });
            let placed = self.order(order_id, cmd).await;
            (order_id, placed.total())
        }

        async fn order(&self, order_id: OrderId, cmd: OrderCommand) -> Order {
            self.platform
                .dispatcher
                .dispatch(ORDER_AGGREGATE, order_id.into(), cmd, |id| Order::empty(id.into()))
                .await
                .unwrap()
                .aggregate
        }

        async fn payment(&self, payment_id: PaymentId, cmd: PaymentCommand) {
            self.platform
                .dispatcher
                .dispatch(PAYMENT_AGGREGATE, payment_id.into(), cmd, |id| {
                    Payment::empty(id.into())
                })
                .await
                .unwrap();
        }

        async fn delivery(&self, delivery_id: DeliveryId, cmd: DeliveryCommand) {
            self.platform
                .dispatcher
                .dispatch(DELIVERY_AGGREGATE, delivery_id.into(), cmd, |id| {
                    Delivery::empty(id.into())
                })
                .await
                .unwrap();
        }

        async fn owner_step(
            &mut self,
            order_id: OrderId,
            step: fn(OrderTransition) -> OrderCommand,
        ) {
            let transition = OrderTransition {
                order_id,
                actor: Actor::user(self.owner),
                occurred_at: Utc::now(),
            };
            self.order(order_id, step(transition)).await;
            self.reactor.process_pending().await;
        }

        fn courier_action(&self, delivery_id: DeliveryId) -> CourierAction {
            CourierAction { delivery_id, courier_id: self.courier, occurred_at: Utc::now() }
        }
    }

    #[tokio::test]
    async fn cash_order_is_delivered_and_the_courier_is_paid() {
        let mut w = world().await;
        let tip = Money::from_cents(200);
        let (order_id, total) = w.place(PaymentMethod::Cash, tip).await;
        let payment_id = PaymentId::new();
        w.payment(
            payment_id,
            PaymentCommand::Initiate(InitiatePayment {
                payment_id,
                order_id,
                payer_id: w.client,
                amount: total,
                method: PaymentMethod::Cash,
                occurred_at: Utc::now(),
            }),
        )
        .await;

        w.owner_step(order_id, OrderCommand::Confirm).await;
        let delivery_id = delivery_id_for(order_id);
        let job = w.platform.read.deliveries.get(delivery_id).unwrap();
        assert_eq!(job.status, DeliveryStatus::Available);
        assert_eq!(job.tip, tip);

        w.owner_step(order_id, OrderCommand::StartPreparing).await;
        w.owner_step(order_id, OrderCommand::MarkReady).await;
        assert!(w.platform.read.deliveries.get(delivery_id).unwrap().ready_for_pickup);

        let accept = DeliveryCommand::Accept(AcceptDelivery {
            delivery_id,
            courier_id: w.courier,
            courier_available: true,
            occurred_at: Utc::now(),
        });
        w.delivery(delivery_id, accept).await;
        w.reactor.process_pending().await;
        assert_eq!(w.platform.read.orders.get(order_id).unwrap().courier_id, Some(w.courier));

        w.delivery(delivery_id, DeliveryCommand::PickUp(w.courier_action(delivery_id))).await;
        w.reactor.process_pending().await;
        w.delivery(delivery_id, DeliveryCommand::Complete(w.courier_action(delivery_id))).await;
        w.reactor.process_pending().await;

        let order = w.platform.read.orders.get(order_id).unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        let payment = w.platform.read.payments.get(payment_id).unwrap();
        assert_eq!(payment.state, PaymentState::Completed);

        let wallet: CourierWallet = w
            .platform
            .dispatcher
            .load(WALLET_AGGREGATE, w.courier.into(), |id| CourierWallet::empty(id.into()))
            .await
            .unwrap();
        assert_eq!(wallet.available(), job.courier_earning + tip);

        let inbox: Inbox = w
            .platform
            .dispatcher
            .load(INBOX_AGGREGATE, w.client.into(), |id| Inbox::empty(id.into()))
            .await
            .unwrap();
        let kinds: Vec<_> = inbox.notifications().iter().map(|n| n.kind).collect();
        assert!(kinds.contains(&NotificationKind::OrderConfirmed));
        assert!(kinds.contains(&NotificationKind::CourierAssigned));
        assert!(kinds.contains(&NotificationKind::OrderDelivered));
        assert!(kinds.contains(&NotificationKind::PaymentCompleted));
    }

    #[tokio::test]
    async fn cancelling_a_paid_order_refunds_the_payment() {
        let mut w = world().await;
        let (order_id, total) = w.place(PaymentMethod::Card, Money::ZERO).await;
        let payment_id = PaymentId::new();
        w.payment(
            payment_id,
            PaymentCommand::Initiate(InitiatePayment {
                payment_id,
                order_id,
                payer_id: w.client,
                amount: total,
                method: PaymentMethod::Card,
                occurred_at: Utc::now(),
            }),
        )
        .await;
        w.payment(
            payment_id,
            PaymentCommand::Complete(CompletePayment {
                payment_id,
                provider_reference: Some("mock_ch_test".into()),
                occurred_at: Utc::now(),
            }),
        )
        .await;
        w.reactor.process_pending().await;
        let order = w.platform.read.orders.get(order_id).unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Paid);

        w.owner_step(order_id, OrderCommand::Confirm).await;
        let cancel = OrderCommand::Cancel(CancelOrder {
            order_id,
            actor: Actor::user(w.owner),
            reason: Some("kitchen closed".into()),
            occurred_at: Utc::now(),
        });
        w.order(order_id, cancel).await;
        w.reactor.process_pending().await;

        let order = w.platform.read.orders.get(order_id).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.payment_status, PaymentStatus::Refunded);
        let payment = w.platform.read.payments.get(payment_id).unwrap();
        assert_eq!(payment.state, PaymentState::Refunded);
        let job = w.platform.read.deliveries.get(delivery_id_for(order_id)).unwrap();
        assert_eq!(job.status, DeliveryStatus::Cancelled);
    }

    #[tokio::test]
    async fn payment_completed_before_a_cancellation_is_processed_is_refunded() {
        let mut w = world().await;
        let (order_id, total) = w.place(PaymentMethod::Card, Money::ZERO).await;
        let payment_id = PaymentId::new();
        w.payment(
            payment_id,
            PaymentCommand::Initiate(InitiatePayment {
                payment_id,
                order_id,
                payer_id: w.client,
                amount: total,
                method: PaymentMethod::Card,
                occurred_at: Utc::now(),
            }),
        )
        .await;
        w.payment(
            payment_id,
            PaymentCommand::Complete(CompletePayment {
                payment_id,
                provider_reference: Some("mock_ch_late".into()),
                occurred_at: Utc::now(),
            }),
        )
        .await;
        // The reactor has not marked the order paid yet.
        let cancel = OrderCommand::Cancel(CancelOrder {
            order_id,
            actor: Actor::user(w.client),
            reason: None,
            occurred_at: Utc::now(),
        });
        w.order(order_id, cancel).await;
        w.reactor.process_pending().await;

        let order = w.platform.read.orders.get(order_id).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.payment_status, PaymentStatus::Refunded);
        let payment = w.platform.read.payments.get(payment_id).unwrap();
        assert_eq!(payment.state, PaymentState::Refunded);
    }

    #[tokio::test]
    async fn unpaid_online_order_cannot_be_confirmed() {
        let w = world().await;
        let (order_id, _) = w.place(PaymentMethod::MobileMoney, Money::ZERO).await;
        let confirm = OrderCommand::Confirm(OrderTransition {
            order_id,
            actor: Actor::user(w.owner),
            occurred_at: Utc::now(),
        });
        let err = w
            .platform
            .dispatcher
            .dispatch(ORDER_AGGREGATE, order_id.into(), confirm, |id| Order::empty(id.into()))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::dispatcher::DispatchError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn order_updates_reach_the_client_room() {
        let mut w = world().await;
        let mut rx = w.platform.hub.subscribe();
        let (order_id, _) = w.place(PaymentMethod::Cash, Money::ZERO).await;
        w.reactor.process_pending().await;

        let mut rooms = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if msg.event == ORDER_UPDATE {
                rooms.push(msg.room);
            }
        }
        assert!(rooms.contains(&Room::Order(order_id)));
        assert!(rooms.contains(&Room::User(w.client)));
        assert!(rooms.contains(&Room::Restaurant(w.restaurant_id)));
    }
}
