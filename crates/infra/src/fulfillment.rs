//! Order fulfillment policy: how facts in one area move the others.
//!
//! | incoming                | follow-up                                        |
//! |-------------------------|--------------------------------------------------|
//! | order confirmed         | create delivery                                  |
//! | order ready             | flag delivery ready for pickup                   |
//! | order cancelled         | cancel delivery, refund or void the payment      |
//! | order paid, cancelled   | refund the payment                               |
//! | payment completed       | mark order paid                                  |
//! | payment refunded        | mark order refunded                              |
//! | delivery accepted       | assign courier                                   |
//! | delivery released       | clear courier                                    |
//! | delivery picked up      | mark order picked up                             |
//! | delivery delivered      | mark order delivered, credit wallet, settle cash |
//!
//! The policy only decides. The reactor executes each follow-up as its own
//! command; a failing follow-up never rolls back the event that caused it.

use serde_json::Value as JsonValue;
use tracing::warn;

use miam_core::{OrderId, PaymentId, UserId};
use miam_delivery::{CreditDelivery, DELIVERY_AGGREGATE, DeliveryEvent};
use miam_events::{EventEnvelope, Policy};
use miam_ordering::{ORDER_AGGREGATE, OrderEvent, PaymentStatus};
use miam_payments::{PAYMENT_AGGREGATE, PaymentEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    CreateDelivery { order_id: OrderId },
    FlagReadyForPickup { order_id: OrderId },
    CancelDelivery { order_id: OrderId, reason: Option<String> },
    RefundPayment { order_id: OrderId, payment_id: PaymentId },
    /// Fail whatever payment is still pending for a cancelled order.
    VoidPendingPayment { order_id: OrderId },
    MarkOrderPaid { order_id: OrderId, payment_id: PaymentId },
    MarkOrderRefunded { order_id: OrderId, payment_id: PaymentId },
    AssignCourier { order_id: OrderId, courier_id: UserId },
    ClearCourier { order_id: OrderId },
    MarkPickedUp { order_id: OrderId },
    MarkDelivered { order_id: OrderId },
    CreditWallet(CreditDelivery),
    /// Cash is collected at the door.
    CompleteCashPayment { order_id: OrderId },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FulfillmentPolicy;

impl FulfillmentPolicy {
    fn on_order(&self, event: OrderEvent) -> Vec<FollowUp> {
        match event {
            OrderEvent::Confirmed(e) => vec![FollowUp::CreateDelivery { order_id: e.order_id }],
            OrderEvent::Ready(e) => vec![FollowUp::FlagReadyForPickup { order_id: e.order_id }],
            OrderEvent::Cancelled(e) => {
                let payment = match (e.payment_status, e.payment_id) {
                    (PaymentStatus::Paid, Some(payment_id)) => {
                        FollowUp::RefundPayment { order_id: e.order_id, payment_id }
                    }
                    _ => FollowUp::VoidPendingPayment { order_id: e.order_id },
                };
                vec![FollowUp::CancelDelivery { order_id: e.order_id, reason: e.reason }, payment]
            }
            // Cancelled while the charge was in flight; nothing was voided.
            OrderEvent::Paid(e) if e.after_cancellation => {
                vec![FollowUp::RefundPayment { order_id: e.order_id, payment_id: e.payment_id }]
            }
            _ => vec![],
        }
    }

    fn on_payment(&self, event: PaymentEvent) -> Vec<FollowUp> {
        match event {
            PaymentEvent::Completed(e) => vec![FollowUp::MarkOrderPaid {
                order_id: e.order_id,
                payment_id: e.payment_id,
            }],
            PaymentEvent::Refunded(e) => vec![FollowUp::MarkOrderRefunded {
                order_id: e.order_id,
                payment_id: e.payment_id,
            }],
            PaymentEvent::Initiated(_) | PaymentEvent::Failed(_) => vec![],
        }
    }

    fn on_delivery(&self, event: DeliveryEvent) -> Vec<FollowUp> {
        match event {
            DeliveryEvent::Accepted(e) => e
                .courier_id
                .map(|courier_id| FollowUp::AssignCourier { order_id: e.order_id, courier_id })
                .into_iter()
                .collect(),
            DeliveryEvent::Released(e) => vec![FollowUp::ClearCourier { order_id: e.order_id }],
            DeliveryEvent::PickedUp(e) => vec![FollowUp::MarkPickedUp { order_id: e.order_id }],
            DeliveryEvent::Delivered(e) => vec![
                FollowUp::MarkDelivered { order_id: e.order_id },
                FollowUp::CreditWallet(CreditDelivery {
                    courier_id: e.courier_id,
                    delivery_id: e.delivery_id,
                    order_id: e.order_id,
                    distance_m: e.distance_m,
                    earning: e.courier_earning,
                    tip: e.tip,
                    occurred_at: e.occurred_at,
                }),
                FollowUp::CompleteCashPayment { order_id: e.order_id },
            ],
            DeliveryEvent::Created(_)
            | DeliveryEvent::ReadyForPickup(_)
            | DeliveryEvent::Cancelled(_) => vec![],
        }
    }
}

impl Policy for FulfillmentPolicy {
    type Action = FollowUp;

    fn name(&self) -> &'static str {
        "fulfillment"
    }

    fn react(&self, envelope: &EventEnvelope<JsonValue>) -> Vec<FollowUp> {
        let decoded = match envelope.aggregate_type() {
            ORDER_AGGREGATE => envelope.decode().map(|e| self.on_order(e)),
            PAYMENT_AGGREGATE => envelope.decode().map(|e| self.on_payment(e)),
            DELIVERY_AGGREGATE => envelope.decode().map(|e| self.on_delivery(e)),
            _ => return vec![],
        };
        decoded.unwrap_or_else(|err| {
            warn!(event_type = envelope.event_type(), error = %err, "undecodable event skipped");
            vec![]
        })
    }
}
