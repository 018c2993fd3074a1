use serde::{Deserialize, Serialize};

/// Who receives a notification, relative to the order or payout it is about.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    Client,
    /// Owner of the restaurant.
    Owner,
    /// The courier assigned at the time of the event, if any.
    Courier,
    Payer,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewOrder,
    OrderConfirmed,
    OrderPreparing,
    OrderReady,
    OrderPickedUp,
    CourierAssigned,
    OrderDelivered,
    OrderCancelled,
    PaymentCompleted,
    PaymentFailed,
    PaymentRefunded,
    PayoutSettled,
    PayoutRejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rendered {
    pub title: String,
    pub body: String,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::NewOrder => "new_order",
            NotificationKind::OrderConfirmed => "order_confirmed",
            NotificationKind::OrderPreparing => "order_preparing",
            NotificationKind::OrderReady => "order_ready",
            NotificationKind::OrderPickedUp => "order_picked_up",
            NotificationKind::CourierAssigned => "courier_assigned",
            NotificationKind::OrderDelivered => "order_delivered",
            NotificationKind::OrderCancelled => "order_cancelled",
            NotificationKind::PaymentCompleted => "payment_completed",
            NotificationKind::PaymentFailed => "payment_failed",
            NotificationKind::PaymentRefunded => "payment_refunded",
            NotificationKind::PayoutSettled => "payout_settled",
            NotificationKind::PayoutRejected => "payout_rejected",
        }
    }

    pub fn audience(self) -> &'static [Audience] {
        use Audience::*;
        match self {
            NotificationKind::NewOrder => &[Owner],
            NotificationKind::OrderConfirmed
            | NotificationKind::OrderPreparing
            | NotificationKind::OrderReady
            | NotificationKind::OrderPickedUp => &[Client],
            NotificationKind::CourierAssigned | NotificationKind::OrderDelivered => {
                &[Client, Owner]
            }
            NotificationKind::OrderCancelled => &[Client, Owner, Courier],
            NotificationKind::PaymentCompleted
            | NotificationKind::PaymentFailed
            | NotificationKind::PaymentRefunded => &[Payer],
            NotificationKind::PayoutSettled | NotificationKind::PayoutRejected => &[Courier],
        }
    }

    /// Title and body shown in the inbox.
    ///
    /// `reference` names the subject (a short order reference or an amount);
    /// `detail` carries a free-text reason when there is one.
    pub fn render(self, reference: &str, detail: Option<&str>) -> Rendered {
        let (title, body) = match self {
            NotificationKind::NewOrder => {
                ("New order", format!("Order {reference} is waiting for confirmation."))
            }
            NotificationKind::OrderConfirmed => {
                ("Order confirmed", format!("The restaurant accepted order {reference}."))
            }
            NotificationKind::OrderPreparing => {
                ("In the kitchen", format!("Order {reference} is being prepared."))
            }
            NotificationKind::OrderReady => {
                ("Ready for pickup", format!("Order {reference} is waiting for a courier."))
            }
            NotificationKind::OrderPickedUp => {
                ("On its way", format!("Your courier picked up order {reference}."))
            }
            NotificationKind::CourierAssigned => {
                ("Courier assigned", format!("A courier is heading to collect order {reference}."))
            }
            NotificationKind::OrderDelivered => {
                ("Delivered", format!("Order {reference} has been delivered."))
            }
            NotificationKind::OrderCancelled => {
                ("Order cancelled", format!("Order {reference} was cancelled."))
            }
            NotificationKind::PaymentCompleted => {
                ("Payment received", format!("Payment for order {reference} went through."))
            }
            NotificationKind::PaymentFailed => {
                ("Payment failed", format!("Payment for order {reference} was declined."))
            }
            NotificationKind::PaymentRefunded => {
                ("Refund issued", format!("Payment for order {reference} was refunded."))
            }
            NotificationKind::PayoutSettled => {
                ("Payout sent", format!("Your payout of {reference} has been paid."))
            }
            NotificationKind::PayoutRejected => (
                "Payout rejected",
                format!("Your payout of {reference} was returned to your balance."),
            ),
        };
        let body = match detail.map(str::trim).filter(|d| !d.is_empty()) {
            Some(detail) => format!("{body} {detail}"),
            None => body,
        };
        Rendered { title: title.to_string(), body }
    }
}

impl core::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_reaches_everyone_involved() {
        assert_eq!(
            NotificationKind::OrderCancelled.audience(),
            &[Audience::Client, Audience::Owner, Audience::Courier]
        );
        assert_eq!(NotificationKind::NewOrder.audience(), &[Audience::Owner]);
        assert_eq!(NotificationKind::PaymentFailed.audience(), &[Audience::Payer]);
    }

    #[test]
    fn wire_name_matches_as_str() {
        let json = serde_json::to_value(NotificationKind::OrderPickedUp).unwrap();
        assert_eq!(json, NotificationKind::OrderPickedUp.as_str());
    }

    #[test]
    fn detail_is_appended_when_present() {
        let r = NotificationKind::OrderCancelled.render("#01J9ZK", Some(" out of stock "));
        assert_eq!(r.title, "Order cancelled");
        assert_eq!(r.body, "Order #01J9ZK was cancelled. out of stock");

        let plain = NotificationKind::OrderCancelled.render("#01J9ZK", Some("  "));
        assert_eq!(plain.body, "Order #01J9ZK was cancelled.");
    }
}
