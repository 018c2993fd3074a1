//! Courier wallet aggregate, one stream per courier (keyed by their user id).
//!
//! Balances move between three buckets: `available` (credited, not yet
//! requested), `pending` (requested payouts awaiting an admin) and `paid_out`.
//! A wallet with no events is a valid empty wallet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use miam_core::{
    Aggregate, AggregateRoot, DeliveryId, DomainError, DomainResult, Money, OrderId, PayoutId,
    UserId,
};
use miam_events::Event;

pub const WALLET_AGGREGATE: &str = "delivery.wallet";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Requested,
    Settled,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletCredit {
    pub delivery_id: DeliveryId,
    pub order_id: OrderId,
    pub distance_m: u32,
    pub earning: Money,
    pub tip: Money,
    pub credited_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRecord {
    pub payout_id: PayoutId,
    pub courier_id: UserId,
    pub amount: Money,
    pub status: PayoutStatus,
    pub requested_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourierWallet {
    courier_id: UserId,
    credits: Vec<WalletCredit>,
    payouts: Vec<PayoutRecord>,
    available: Money,
    pending: Money,
    paid_out: Money,
    version: u64,
}

impl CourierWallet {
    pub fn empty(courier_id: UserId) -> Self {
        Self {
            courier_id,
            credits: Vec::new(),
            payouts: Vec::new(),
            available: Money::ZERO,
            pending: Money::ZERO,
            paid_out: Money::ZERO,
            version: 0,
        }
    }

    pub fn courier_id(&self) -> UserId {
        self.courier_id
    }

    pub fn credits(&self) -> &[WalletCredit] {
        &self.credits
    }

    pub fn payouts(&self) -> &[PayoutRecord] {
        &self.payouts
    }

    pub fn payout(&self, id: PayoutId) -> Option<&PayoutRecord> {
        self.payouts.iter().find(|p| p.payout_id == id)
    }

    pub fn available(&self) -> Money {
        self.available
    }

    pub fn pending(&self) -> Money {
        self.pending
    }

    pub fn paid_out(&self) -> Money {
        self.paid_out
    }

    /// Everything ever credited.
    pub fn lifetime_earnings(&self) -> Money {
        self.credits.iter().map(|c| c.earning + c.tip).sum()
    }

    fn requested_payout(&self, id: PayoutId) -> DomainResult<&PayoutRecord> {
        let payout = self.payout(id).ok_or(DomainError::NotFound)?;
        if payout.status != PayoutStatus::Requested {
            return Err(DomainError::invariant("payout already resolved"));
        }
        Ok(payout)
    }
}

impl AggregateRoot for CourierWallet {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.courier_id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditDelivery {
    pub courier_id: UserId,
    pub delivery_id: DeliveryId,
    pub order_id: OrderId,
    pub distance_m: u32,
    pub earning: Money,
    pub tip: Money,
    pub occurred_at: DateTime<Utc>,
}

/// `amount: None` requests the whole available balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPayout {
    pub courier_id: UserId,
    pub payout_id: PayoutId,
    pub amount: Option<Money>,
    pub minimum: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlePayout {
    pub courier_id: UserId,
    pub payout_id: PayoutId,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectPayout {
    pub courier_id: UserId,
    pub payout_id: PayoutId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletCommand {
    Credit(CreditDelivery),
    RequestPayout(RequestPayout),
    SettlePayout(SettlePayout),
    RejectPayout(RejectPayout),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletCredited {
    pub courier_id: UserId,
    pub credit: WalletCredit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRequested {
    pub courier_id: UserId,
    pub payout_id: PayoutId,
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutResolved {
    pub courier_id: UserId,
    pub payout_id: PayoutId,
    pub amount: Money,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletEvent {
    Credited(WalletCredited),
    PayoutRequested(PayoutRequested),
    PayoutSettled(PayoutResolved),
    PayoutRejected(PayoutResolved),
}

impl WalletEvent {
    pub fn courier_id(&self) -> UserId {
        match self {
            WalletEvent::Credited(e) => e.courier_id,
            WalletEvent::PayoutRequested(e) => e.courier_id,
            WalletEvent::PayoutSettled(e) | WalletEvent::PayoutRejected(e) => e.courier_id,
        }
    }
}

impl Event for WalletEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WalletEvent::Credited(_) => "delivery.wallet.credited",
            WalletEvent::PayoutRequested(_) => "delivery.wallet.payout_requested",
            WalletEvent::PayoutSettled(_) => "delivery.wallet.payout_settled",
            WalletEvent::PayoutRejected(_) => "delivery.wallet.payout_rejected",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            WalletEvent::Credited(e) => e.credit.credited_at,
            WalletEvent::PayoutRequested(e) => e.occurred_at,
            WalletEvent::PayoutSettled(e) | WalletEvent::PayoutRejected(e) => e.occurred_at,
        }
    }
}

impl Aggregate for CourierWallet {
    type Command = WalletCommand;
    type Event = WalletEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            WalletEvent::Credited(e) => {
                self.courier_id = e.courier_id;
                self.available = self.available + e.credit.earning + e.credit.tip;
                self.credits.push(e.credit.clone());
            }
            WalletEvent::PayoutRequested(e) => {
                self.available = Money::from_cents(self.available.cents() - e.amount.cents());
                self.pending = self.pending + e.amount;
                self.payouts.push(PayoutRecord {
                    payout_id: e.payout_id,
                    courier_id: e.courier_id,
                    amount: e.amount,
                    status: PayoutStatus::Requested,
                    requested_at: e.occurred_at,
                    resolved_at: None,
                    note: None,
                });
            }
            WalletEvent::PayoutSettled(e) | WalletEvent::PayoutRejected(e) => {
                let settled = matches!(event, WalletEvent::PayoutSettled(_));
                self.pending = Money::from_cents(self.pending.cents() - e.amount.cents());
                if settled {
                    self.paid_out = self.paid_out + e.amount;
                } else {
                    self.available = self.available + e.amount;
                }
                if let Some(p) = self.payouts.iter_mut().find(|p| p.payout_id == e.payout_id) {
                    p.status = if settled { PayoutStatus::Settled } else { PayoutStatus::Rejected };
                    p.resolved_at = Some(e.occurred_at);
                    p.note = e.note.clone();
                }
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            WalletCommand::Credit(cmd) => {
                // Redelivered completion events must not pay twice.
                if self.credits.iter().any(|c| c.delivery_id == cmd.delivery_id) {
                    return Ok(vec![]);
                }
                if cmd.earning.is_negative() || cmd.tip.is_negative() {
                    return Err(DomainError::validation("credits cannot be negative"));
                }
                Ok(vec![WalletEvent::Credited(WalletCredited {
                    courier_id: cmd.courier_id,
                    credit: WalletCredit {
                        delivery_id: cmd.delivery_id,
                        order_id: cmd.order_id,
                        distance_m: cmd.distance_m,
                        earning: cmd.earning,
                        tip: cmd.tip,
                        credited_at: cmd.occurred_at,
                    },
                })])
            }
            WalletCommand::RequestPayout(cmd) => {
                if self.payout(cmd.payout_id).is_some() {
                    return Err(DomainError::conflict("payout already requested"));
                }
                let amount = cmd.amount.unwrap_or(self.available);
                if !amount.is_positive() || amount < cmd.minimum {
                    return Err(DomainError::invariant(format!(
                        "payout must be at least {}",
                        cmd.minimum
                    )));
                }
                if amount > self.available {
                    return Err(DomainError::invariant(format!(
                        "only {} is available for payout",
                        self.available
                    )));
                }
                Ok(vec![WalletEvent::PayoutRequested(PayoutRequested {
                    courier_id: self.courier_id,
                    payout_id: cmd.payout_id,
                    amount,
                    occurred_at: cmd.occurred_at,
                })])
            }
            WalletCommand::SettlePayout(cmd) => {
                let payout = self.requested_payout(cmd.payout_id)?;
                Ok(vec![WalletEvent::PayoutSettled(PayoutResolved {
                    courier_id: self.courier_id,
                    payout_id: payout.payout_id,
                    amount: payout.amount,
                    note: cmd.reference.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            WalletCommand::RejectPayout(cmd) => {
                let payout = self.requested_payout(cmd.payout_id)?;
                let reason = cmd.reason.trim();
                if reason.is_empty() {
                    return Err(DomainError::validation("a rejection needs a reason"));
                }
                Ok(vec![WalletEvent::PayoutRejected(PayoutResolved {
                    courier_id: self.courier_id,
                    payout_id: payout.payout_id,
                    amount: payout.amount,
                    note: Some(reason.to_string()),
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use miam_events::execute;
    use proptest::prelude::*;

    use super::*;

    const MIN: Money = Money::from_cents(1_000);

    fn credit(courier_id: UserId, delivery: DeliveryId, earning: i64, tip: i64) -> WalletCommand {
        WalletCommand::Credit(CreditDelivery {
            courier_id,
            delivery_id: delivery,
            order_id: OrderId::new(),
            distance_m: 2_000,
            earning: Money::from_cents(earning),
            tip: Money::from_cents(tip),
            occurred_at: Utc::now(),
        })
    }

    fn request(courier_id: UserId, amount: Option<i64>) -> WalletCommand {
        WalletCommand::RequestPayout(RequestPayout {
            courier_id,
            payout_id: PayoutId::new(),
            amount: amount.map(Money::from_cents),
            minimum: MIN,
            occurred_at: Utc::now(),
        })
    }

    fn funded(cents: i64) -> CourierWallet {
        let courier = UserId::new();
        let mut w = CourierWallet::empty(courier);
        execute(&mut w, &credit(courier, DeliveryId::new(), cents, 0)).unwrap();
        w
    }

    #[test]
    fn credits_are_idempotent_per_delivery() {
        let courier = UserId::new();
        let mut w = CourierWallet::empty(courier);
        let delivery = DeliveryId::new();
        execute(&mut w, &credit(courier, delivery, 349, 100)).unwrap();
        assert!(execute(&mut w, &credit(courier, delivery, 349, 100)).unwrap().is_empty());
        assert_eq!(w.available(), Money::from_cents(449));
        assert_eq!(w.credits().len(), 1);
    }

    #[test]
    fn payout_defaults_to_everything_available() {
        let mut w = funded(1_500);
        let courier = w.courier_id();
        execute(&mut w, &request(courier, None)).unwrap();
        assert_eq!(w.available(), Money::ZERO);
        assert_eq!(w.pending(), Money::from_cents(1_500));
    }

    #[test]
    fn payout_bounds() {
        let w = funded(1_500);
        let courier = w.courier_id();
        assert!(matches!(
            w.handle(&request(courier, Some(999))),
            Err(DomainError::InvariantViolation(_))
        ));
        assert!(matches!(
            w.handle(&request(courier, Some(1_501))),
            Err(DomainError::InvariantViolation(_))
        ));
        assert!(w.handle(&request(courier, Some(1_000))).is_ok());
        assert!(w.handle(&request(courier, Some(1_500))).is_ok());

        let small = funded(500);
        let courier = small.courier_id();
        assert!(small.handle(&request(courier, None)).is_err());
    }

    #[test]
    fn settle_and_reject_move_pending_funds() {
        let mut w = funded(3_000);
        let courier = w.courier_id();
        execute(&mut w, &request(courier, Some(1_000))).unwrap();
        execute(&mut w, &request(courier, Some(1_200))).unwrap();
        let first = w.payouts()[0].payout_id;
        let second = w.payouts()[1].payout_id;

        execute(
            &mut w,
            &WalletCommand::SettlePayout(SettlePayout {
                courier_id: courier,
                payout_id: first,
                reference: Some("wave-8812".into()),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        execute(
            &mut w,
            &WalletCommand::RejectPayout(RejectPayout {
                courier_id: courier,
                payout_id: second,
                reason: "account details mismatch".into(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        assert_eq!(w.paid_out(), Money::from_cents(1_000));
        assert_eq!(w.pending(), Money::ZERO);
        assert_eq!(w.available(), Money::from_cents(2_000));
        assert_eq!(w.payout(second).map(|p| p.status), Some(PayoutStatus::Rejected));

        let settle_again = WalletCommand::SettlePayout(SettlePayout {
            courier_id: courier,
            payout_id: first,
            reference: None,
            occurred_at: Utc::now(),
        });
        assert!(w.handle(&settle_again).is_err());
    }

    proptest! {
        #[test]
        fn buckets_always_sum_to_lifetime_earnings(
            credits in proptest::collection::vec((0i64..5_000, 0i64..1_000), 1..20),
            requests in proptest::collection::vec(proptest::option::of(1_000i64..6_000), 0..6),
        ) {
            let courier = UserId::new();
            let mut w = CourierWallet::empty(courier);
            for (earning, tip) in credits {
                execute(&mut w, &credit(courier, DeliveryId::new(), earning, tip)).unwrap();
            }
            for amount in requests {
                let _ = execute(&mut w, &request(courier, amount));
            }
            prop_assert!(!w.available().is_negative());
            prop_assert_eq!(w.available() + w.pending() + w.paid_out(), w.lifetime_earnings());
        }
    }
}
