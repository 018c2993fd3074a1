use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use miam_core::{Aggregate, AggregateRoot, DomainError, Money, OrderId, PaymentId, UserId};
use miam_events::Event;
use miam_ordering::PaymentMethod;

pub const PAYMENT_AGGREGATE: &str = "payments.payment";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Pending,
    Completed,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    id: PaymentId,
    order_id: Option<OrderId>,
    payer_id: Option<UserId>,
    amount: Money,
    method: PaymentMethod,
    state: PaymentState,
    provider_reference: Option<String>,
    version: u64,
    created: bool,
}

impl Payment {
    pub fn empty(id: PaymentId) -> Self {
        Self {
            id,
            order_id: None,
            payer_id: None,
            amount: Money::ZERO,
            method: PaymentMethod::Card,
            state: PaymentState::Pending,
            provider_reference: None,
            version: 0,
            created: false,
        }
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn state(&self) -> PaymentState {
        self.state
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn method(&self) -> PaymentMethod {
        self.method
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn payer_id(&self) -> Option<UserId> {
        self.payer_id
    }

    pub fn provider_reference(&self) -> Option<&str> {
        self.provider_reference.as_deref()
    }

    fn ensure_pending(&self) -> Result<(OrderId, UserId), DomainError> {
        let (Some(order_id), Some(payer_id), true) = (self.order_id, self.payer_id, self.created)
        else {
            return Err(DomainError::NotFound);
        };
        if self.state != PaymentState::Pending {
            return Err(DomainError::invariant("payment is no longer pending"));
        }
        Ok((order_id, payer_id))
    }
}

impl AggregateRoot for Payment {
    type Id = PaymentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiatePayment {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub payer_id: UserId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletePayment {
    pub payment_id: PaymentId,
    pub provider_reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailPayment {
    pub payment_id: PaymentId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundPayment {
    pub payment_id: PaymentId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentCommand {
    Initiate(InitiatePayment),
    Complete(CompletePayment),
    Fail(FailPayment),
    Refund(RefundPayment),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInitiated {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub payer_id: UserId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCompleted {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub payer_id: UserId,
    pub amount: Money,
    pub provider_reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFailed {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub payer_id: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRefunded {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub payer_id: UserId,
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentEvent {
    Initiated(PaymentInitiated),
    Completed(PaymentCompleted),
    Failed(PaymentFailed),
    Refunded(PaymentRefunded),
}

impl Event for PaymentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PaymentEvent::Initiated(_) => "payments.payment.initiated",
            PaymentEvent::Completed(_) => "payments.payment.completed",
            PaymentEvent::Failed(_) => "payments.payment.failed",
            PaymentEvent::Refunded(_) => "payments.payment.refunded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PaymentEvent::Initiated(e) => e.occurred_at,
            PaymentEvent::Completed(e) => e.occurred_at,
            PaymentEvent::Failed(e) => e.occurred_at,
            PaymentEvent::Refunded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Payment {
    type Command = PaymentCommand;
    type Event = PaymentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PaymentEvent::Initiated(e) => {
                self.id = e.payment_id;
                self.order_id = Some(e.order_id);
                self.payer_id = Some(e.payer_id);
                self.amount = e.amount;
                self.method = e.method;
                self.state = PaymentState::Pending;
                self.created = true;
            }
            PaymentEvent::Completed(e) => {
                self.state = PaymentState::Completed;
                self.provider_reference = e.provider_reference.clone();
            }
            PaymentEvent::Failed(_) => self.state = PaymentState::Failed,
            PaymentEvent::Refunded(_) => self.state = PaymentState::Refunded,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PaymentCommand::Initiate(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("payment already exists"));
                }
                if !cmd.amount.is_positive() {
                    return Err(DomainError::validation("payment amount must be positive"));
                }
                Ok(vec![PaymentEvent::Initiated(PaymentInitiated {
                    payment_id: cmd.payment_id,
                    order_id: cmd.order_id,
                    payer_id: cmd.payer_id,
                    amount: cmd.amount,
                    method: cmd.method,
                    occurred_at: cmd.occurred_at,
                })])
            }
            PaymentCommand::Complete(cmd) => {
                if self.state == PaymentState::Completed {
                    return Ok(vec![]);
                }
                let (order_id, payer_id) = self.ensure_pending()?;
                Ok(vec![PaymentEvent::Completed(PaymentCompleted {
                    payment_id: self.id,
                    order_id,
                    payer_id,
                    amount: self.amount,
                    provider_reference: cmd.provider_reference.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            PaymentCommand::Fail(cmd) => {
                let (order_id, payer_id) = self.ensure_pending()?;
                Ok(vec![PaymentEvent::Failed(PaymentFailed {
                    payment_id: self.id,
                    order_id,
                    payer_id,
                    reason: cmd.reason.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            PaymentCommand::Refund(cmd) => {
                if !self.created {
                    return Err(DomainError::NotFound);
                }
                match self.state {
                    PaymentState::Refunded => Ok(vec![]),
                    PaymentState::Completed => {
                        let (Some(order_id), Some(payer_id)) = (self.order_id, self.payer_id)
                        else {
                            return Err(DomainError::NotFound);
                        };
                        Ok(vec![PaymentEvent::Refunded(PaymentRefunded {
                            payment_id: self.id,
                            order_id,
                            payer_id,
                            amount: self.amount,
                            occurred_at: cmd.occurred_at,
                        })])
                    }
                    _ => Err(DomainError::invariant("only completed payments can be refunded")),
                }
            }
        }
    }
}
