//! Background consumer of the event bus.
//!
//! For every committed envelope the reactor
//! 1. pushes realtime messages to the rooms concerned,
//! 2. executes the fulfillment follow-ups as commands of their own,
//! 3. delivers inbox notifications.
//!
//! Follow-ups that fail are logged and dropped. The originating command has
//! already committed and is never rolled back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use miam_core::{AggregateId, OrderId, PaymentId};
use miam_delivery::{
    CancelDelivery, CourierWallet, CreateDelivery, DELIVERY_AGGREGATE, Delivery, DeliveryCommand,
    MarkReadyForPickup, WALLET_AGGREGATE, WalletCommand, delivery_id_for,
};
use miam_events::{EventEnvelope, Policy, Subscription};
use miam_notifications::{DeliverNotification, INBOX_AGGREGATE, Inbox, InboxCommand};
use miam_ordering::{
    AssignCourier, ORDER_AGGREGATE, Order, OrderCommand, OrderSignal, PaymentMethod, PaymentSignal,
};
use miam_payments::{
    CompletePayment, FailPayment, GatewayError, PAYMENT_AGGREGATE, Payment, PaymentCommand,
    PaymentGateway, PaymentState, RefundPayment,
};

use crate::dispatcher::{DispatchError, SharedDispatcher};
use crate::fulfillment::{FollowUp, FulfillmentPolicy};
use crate::notifier::{Notifier, PendingNotification};
use crate::projections::PaymentsProjection;
use crate::realtime::RealtimeHub;

#[derive(Debug, Error)]
pub enum ReactorError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("order {0} has no delivery terms")]
    MissingOrder(OrderId),
}

impl ReactorError {
    /// Outcomes expected when events race or arrive twice.
    fn is_benign(&self) -> bool {
        matches!(
            self,
            ReactorError::Dispatch(DispatchError::NotFound | DispatchError::Conflict(_))
        )
    }
}

pub struct Reactor {
    dispatcher: SharedDispatcher,
    gateway: Arc<dyn PaymentGateway>,
    payments: Arc<PaymentsProjection>,
    hub: RealtimeHub,
    policy: FulfillmentPolicy,
    notifier: Notifier,
    subscription: Subscription<EventEnvelope<JsonValue>>,
}

impl Reactor {
    /// Subscribes immediately, so nothing committed after construction is missed.
    pub fn new(
        dispatcher: SharedDispatcher,
        gateway: Arc<dyn PaymentGateway>,
        payments: Arc<PaymentsProjection>,
        hub: RealtimeHub,
    ) -> Self {
        let subscription = dispatcher.subscribe();
        Self {
            dispatcher,
            gateway,
            payments,
            hub,
            policy: FulfillmentPolicy,
            notifier: Notifier,
            subscription,
        }
    }

    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(policy = self.policy.name(), "reactor started");
            while let Some(envelope) = self.subscription.recv().await {
                self.handle(&envelope).await;
            }
            info!("event bus closed, reactor stopped");
        })
    }

    /// Drain everything already published, including events produced while
    /// draining. Returns the number of envelopes handled.
    pub async fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(envelope) = self.subscription.try_recv() {
            self.handle(&envelope).await;
            handled += 1;
        }
        handled
    }

    async fn handle(&self, envelope: &EventEnvelope<JsonValue>) {
        self.hub.broadcast_envelope(envelope);

        let at = envelope.occurred_at();
        for follow_up in self.policy.react(envelope) {
            let label = format!("{follow_up:?}");
            match self.execute(follow_up, at).await {
                Ok(()) => {}
                Err(err) if err.is_benign() => {
                    debug!(follow_up = %label, error = %err, "follow-up skipped")
                }
                Err(err) => warn!(
                    follow_up = %label,
                    event_type = envelope.event_type(),
                    error = %err,
                    "follow-up failed"
                ),
            }
        }

        for notification in self.notifier.notifications_for(envelope) {
            if let Err(err) = self.deliver(notification, at).await {
                warn!(event_type = envelope.event_type(), error = %err, "notification dropped");
            }
        }
    }

    async fn execute(&self, follow_up: FollowUp, at: DateTime<Utc>) -> Result<(), ReactorError> {
        match follow_up {
            FollowUp::CreateDelivery { order_id } => self.create_delivery(order_id, at).await,
            FollowUp::FlagReadyForPickup { order_id } => {
                let delivery_id = delivery_id_for(order_id);
                let cmd = DeliveryCommand::MarkReadyForPickup(MarkReadyForPickup {
                    delivery_id,
                    occurred_at: at,
                });
                self.delivery(order_id, cmd).await
            }
            FollowUp::CancelDelivery { order_id, reason } => {
                let delivery_id = delivery_id_for(order_id);
                let cancel = CancelDelivery { delivery_id, reason, occurred_at: at };
                self.delivery(order_id, DeliveryCommand::Cancel(cancel)).await
            }
            FollowUp::RefundPayment { payment_id, .. } => {
                let payment: Payment = self
                    .dispatcher
                    .load(PAYMENT_AGGREGATE, payment_id.into(), |id| Payment::empty(id.into()))
                    .await?;
                if payment.state() != PaymentState::Completed {
                    return Ok(());
                }
                if let Some(reference) = payment.provider_reference() {
                    let refund_ref = self.gateway.refund(reference, payment.amount()).await?;
                    info!(%payment_id, %refund_ref, "payment refunded at provider");
                }
                let cmd = PaymentCommand::Refund(RefundPayment { payment_id, occurred_at: at });
                self.payment(payment_id, cmd).await
            }
            FollowUp::VoidPendingPayment { order_id } => {
                let Some(pending) = self.pending_payment(order_id) else {
                    return Ok(());
                };
                let cmd = PaymentCommand::Fail(FailPayment {
                    payment_id: pending,
                    reason: "order cancelled".into(),
                    occurred_at: at,
                });
                self.payment(pending, cmd).await
            }
            FollowUp::MarkOrderPaid { order_id, payment_id } => {
                let signal = PaymentSignal { order_id, payment_id, occurred_at: at };
                self.order(order_id, OrderCommand::MarkPaid(signal)).await
            }
            FollowUp::MarkOrderRefunded { order_id, payment_id } => {
                let signal = PaymentSignal { order_id, payment_id, occurred_at: at };
                self.order(order_id, OrderCommand::MarkRefunded(signal)).await
            }
            FollowUp::AssignCourier { order_id, courier_id } => {
                let cmd = AssignCourier { order_id, courier_id, occurred_at: at };
                self.order(order_id, OrderCommand::AssignCourier(cmd)).await
            }
            FollowUp::ClearCourier { order_id } => {
                let signal = OrderSignal { order_id, occurred_at: at };
                self.order(order_id, OrderCommand::ClearCourier(signal)).await
            }
            FollowUp::MarkPickedUp { order_id } => {
                let signal = OrderSignal { order_id, occurred_at: at };
                self.order(order_id, OrderCommand::MarkPickedUp(signal)).await
            }
            FollowUp::MarkDelivered { order_id } => {
                let signal = OrderSignal { order_id, occurred_at: at };
                self.order(order_id, OrderCommand::MarkDelivered(signal)).await
            }
            FollowUp::CreditWallet(credit) => {
                let wallet_id = AggregateId::from(credit.courier_id);
                self.dispatcher
                    .dispatch(WALLET_AGGREGATE, wallet_id, WalletCommand::Credit(credit), |id| {
                        CourierWallet::empty(id.into())
                    })
                    .await?;
                Ok(())
            }
            FollowUp::CompleteCashPayment { order_id } => {
                let Some(view) = self.payments.active_for_order(order_id) else {
                    return Ok(());
                };
                if view.state != PaymentState::Pending || view.method != PaymentMethod::Cash {
                    return Ok(());
                }
                let cmd = PaymentCommand::Complete(CompletePayment {
                    payment_id: view.payment_id,
                    provider_reference: None,
                    occurred_at: at,
                });
                self.payment(view.payment_id, cmd).await
            }
        }
    }

    async fn create_delivery(
        &self,
        order_id: OrderId,
        at: DateTime<Utc>,
    ) -> Result<(), ReactorError> {
        let order: Order = self
            .dispatcher
            .load(ORDER_AGGREGATE, order_id.into(), |id| Order::empty(id.into()))
            .await?;
        let (Some(terms), Some(parties)) = (order.terms(), order.parties()) else {
            return Err(ReactorError::MissingOrder(order_id));
        };
        let cmd = DeliveryCommand::Create(CreateDelivery {
            delivery_id: delivery_id_for(order_id),
            order_id,
            restaurant_id: parties.restaurant_id,
            client_id: parties.client_id,
            pickup: terms.pickup.clone(),
            dropoff: terms.dropoff.clone(),
            distance_m: terms.distance_m,
            delivery_fee: terms.delivery_fee,
            courier_earning: terms.courier_earning,
            tip: terms.tip,
            occurred_at: at,
        });
        self.delivery(order_id, cmd).await
    }

    fn pending_payment(&self, order_id: OrderId) -> Option<PaymentId> {
        self.payments
            .active_for_order(order_id)
            .filter(|p| p.state == PaymentState::Pending)
            .map(|p| p.payment_id)
    }

    async fn deliver(
        &self,
        n: PendingNotification,
        at: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        let cmd = InboxCommand::Deliver(DeliverNotification {
            recipient_id: n.recipient_id,
            notification_id: n.notification_id,
            kind: n.kind,
            title: n.rendered.title,
            body: n.rendered.body,
            order_id: n.order_id,
            occurred_at: at,
        });
        self.dispatcher
            .dispatch(INBOX_AGGREGATE, n.recipient_id.into(), cmd, |id| Inbox::empty(id.into()))
            .await?;
        Ok(())
    }

    async fn order(&self, order_id: OrderId, cmd: OrderCommand) -> Result<(), ReactorError> {
        self.dispatcher
            .dispatch(ORDER_AGGREGATE, order_id.into(), cmd, |id| Order::empty(id.into()))
            .await?;
        Ok(())
    }

    async fn delivery(&self, order_id: OrderId, cmd: DeliveryCommand) -> Result<(), ReactorError> {
        let delivery_id = delivery_id_for(order_id);
        self.dispatcher
            .dispatch(DELIVERY_AGGREGATE, delivery_id.into(), cmd, |id| Delivery::empty(id.into()))
            .await?;
        Ok(())
    }

    async fn payment(
        &self,
        payment_id: PaymentId,
        cmd: PaymentCommand,
    ) -> Result<(), ReactorError> {
        self.dispatcher
            .dispatch(PAYMENT_AGGREGATE, payment_id.into(), cmd, |id| Payment::empty(id.into()))
            .await?;
        Ok(())
    }
}
