//! Turns committed events into inbox deliveries.
//!
//! Each event yields at most one notification kind; the kind's audience is
//! resolved against the parties named on the event. The notification id is
//! the event id, so a redelivered event lands on the same inbox entry.

use serde_json::Value as JsonValue;
use tracing::warn;

use miam_core::{Money, NotificationId, OrderId, UserId};
use miam_delivery::{WALLET_AGGREGATE, WalletEvent};
use miam_events::EventEnvelope;
use miam_notifications::{Audience, NotificationKind, Rendered};
use miam_ordering::{ORDER_AGGREGATE, OrderEvent, OrderParties};
use miam_payments::{PAYMENT_AGGREGATE, PaymentEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingNotification {
    pub notification_id: NotificationId,
    pub recipient_id: UserId,
    pub kind: NotificationKind,
    pub rendered: Rendered,
    pub order_id: Option<OrderId>,
}

/// Short human reference for an order, e.g. `#0191c2a4`.
pub fn order_reference(order_id: OrderId) -> String {
    let simple = order_id.as_uuid().simple().to_string();
    format!("#{}", &simple[..8])
}

#[derive(Debug, Default, Clone, Copy)]
struct Recipients {
    client: Option<UserId>,
    owner: Option<UserId>,
    courier: Option<UserId>,
    payer: Option<UserId>,
}

impl Recipients {
    fn of_order(parties: &OrderParties) -> Self {
        Self {
            client: Some(parties.client_id),
            owner: Some(parties.owner_id),
            courier: parties.courier_id,
            payer: None,
        }
    }

    fn resolve(self, kind: NotificationKind) -> Vec<UserId> {
        let mut out: Vec<UserId> = kind
            .audience()
            .iter()
            .filter_map(|a| match a {
                Audience::Client => self.client,
                Audience::Owner => self.owner,
                Audience::Courier => self.courier,
                Audience::Payer => self.payer,
            })
            .collect();
        out.dedup();
        out
    }
}

struct Draft {
    kind: NotificationKind,
    recipients: Recipients,
    reference: String,
    detail: Option<String>,
    order_id: Option<OrderId>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Notifier;

impl Notifier {
    pub fn notifications_for(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Vec<PendingNotification> {
        let draft = match envelope.aggregate_type() {
            ORDER_AGGREGATE => envelope.decode().map(order_draft),
            PAYMENT_AGGREGATE => envelope.decode().map(payment_draft),
            WALLET_AGGREGATE => envelope.decode().map(wallet_draft),
            _ => return vec![],
        };
        let draft = match draft {
            Ok(Some(draft)) => draft,
            Ok(None) => return vec![],
            Err(err) => {
                let event_type = envelope.event_type();
                warn!(event_type, error = %err, "undecodable event skipped");
                return vec![];
            }
        };

        let notification_id = NotificationId::from_uuid(envelope.event_id());
        let rendered = draft.kind.render(&draft.reference, draft.detail.as_deref());
        draft
            .recipients
            .resolve(draft.kind)
            .into_iter()
            .map(|recipient_id| PendingNotification {
                notification_id,
                recipient_id,
                kind: draft.kind,
                rendered: rendered.clone(),
                order_id: draft.order_id,
            })
            .collect()
    }
}

fn order_draft(event: OrderEvent) -> Option<Draft> {
    let kind = match &event {
        OrderEvent::Placed(_) => NotificationKind::NewOrder,
        OrderEvent::Confirmed(_) => NotificationKind::OrderConfirmed,
        OrderEvent::PreparationStarted(_) => NotificationKind::OrderPreparing,
        OrderEvent::Ready(_) => NotificationKind::OrderReady,
        OrderEvent::PickedUp(_) => NotificationKind::OrderPickedUp,
        OrderEvent::CourierAssigned(_) => NotificationKind::CourierAssigned,
        OrderEvent::Delivered(_) => NotificationKind::OrderDelivered,
        OrderEvent::Cancelled(_) => NotificationKind::OrderCancelled,
        OrderEvent::CourierCleared(_) | OrderEvent::Paid(_) | OrderEvent::Refunded(_) => {
            return None;
        }
    };
    let parties = event.parties();
    let order_id = event.order_id();
    let detail = match &event {
        OrderEvent::Cancelled(e) => e.reason.clone(),
        _ => None,
    };
    Some(Draft {
        kind,
        recipients: Recipients::of_order(parties),
        reference: order_reference(order_id),
        detail,
        order_id: Some(order_id),
    })
}

fn payment_draft(event: PaymentEvent) -> Option<Draft> {
    let (kind, order_id, payer_id, detail) = match event {
        PaymentEvent::Initiated(_) => return None,
        PaymentEvent::Completed(e) => {
            (NotificationKind::PaymentCompleted, e.order_id, e.payer_id, None)
        }
        PaymentEvent::Failed(e) => {
            (NotificationKind::PaymentFailed, e.order_id, e.payer_id, Some(e.reason))
        }
        PaymentEvent::Refunded(e) => {
            (NotificationKind::PaymentRefunded, e.order_id, e.payer_id, None)
        }
    };
    Some(Draft {
        kind,
        recipients: Recipients { payer: Some(payer_id), ..Default::default() },
        reference: order_reference(order_id),
        detail,
        order_id: Some(order_id),
    })
}

fn wallet_draft(event: WalletEvent) -> Option<Draft> {
    let (kind, e) = match event {
        WalletEvent::PayoutSettled(e) => (NotificationKind::PayoutSettled, e),
        WalletEvent::PayoutRejected(e) => (NotificationKind::PayoutRejected, e),
        WalletEvent::Credited(_) | WalletEvent::PayoutRequested(_) => return None,
    };
    let detail = match kind {
        NotificationKind::PayoutRejected => e.note,
        _ => None,
    };
    Some(Draft {
        kind,
        recipients: Recipients { courier: Some(e.courier_id), ..Default::default() },
        reference: amount_reference(e.amount),
        detail,
        order_id: None,
    })
}

fn amount_reference(amount: Money) -> String {
    amount.to_string()
}
