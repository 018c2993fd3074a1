use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use miam_core::{Money, OrderId, PaymentId, UserId};
use miam_events::{EventEnvelope, Projection, ProjectionError, StreamCursors};
use miam_ordering::PaymentMethod;
use miam_payments::{PAYMENT_AGGREGATE, PaymentEvent, PaymentState};

use crate::read_model::{InMemoryStore, KeyedStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentView {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub payer_id: UserId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub state: PaymentState,
    pub provider_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct PaymentsProjection<S = InMemoryStore<PaymentId, PaymentView>> {
    store: S,
    cursors: StreamCursors,
}

impl PaymentsProjection {
    pub fn in_memory() -> Self {
        Self::new(InMemoryStore::new())
    }
}

impl<S> PaymentsProjection<S>
where
    S: KeyedStore<PaymentId, PaymentView>,
{
    pub fn new(store: S) -> Self {
        Self { store, cursors: StreamCursors::new() }
    }

    pub fn get(&self, id: PaymentId) -> Option<PaymentView> {
        self.store.get(&id)
    }

    /// Newest first.
    pub fn for_payer(&self, payer_id: UserId) -> Vec<PaymentView> {
        let mut out: Vec<_> =
            self.store.list().into_iter().filter(|p| p.payer_id == payer_id).collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    pub fn for_order(&self, order_id: OrderId) -> Vec<PaymentView> {
        let mut out: Vec<_> =
            self.store.list().into_iter().filter(|p| p.order_id == order_id).collect();
        out.sort_by_key(|p| p.created_at);
        out
    }

    /// The payment that blocks a new attempt: pending or already completed.
    pub fn active_for_order(&self, order_id: OrderId) -> Option<PaymentView> {
        self.for_order(order_id)
            .into_iter()
            .find(|p| matches!(p.state, PaymentState::Pending | PaymentState::Completed))
    }

    fn touch(
        &self,
        id: PaymentId,
        at: DateTime<Utc>,
        f: impl FnOnce(&mut PaymentView),
    ) -> Result<(), ProjectionError> {
        let found = self.store.update(&id, |view| {
            f(view);
            view.updated_at = at;
        });
        if found {
            Ok(())
        } else {
            Err(ProjectionError::Inconsistent(format!("payment {id} was never initiated")))
        }
    }
}

impl<S> Projection for PaymentsProjection<S>
where
    S: KeyedStore<PaymentId, PaymentView>,
{
    fn name(&self) -> &'static str {
        "payments"
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != PAYMENT_AGGREGATE || !self.cursors.should_apply(envelope)? {
            return Ok(());
        }
        let event: PaymentEvent =
            envelope.decode().map_err(|e| ProjectionError::deserialize(envelope, e))?;

        match event {
            PaymentEvent::Initiated(e) => self.store.upsert(
                e.payment_id,
                PaymentView {
                    payment_id: e.payment_id,
                    order_id: e.order_id,
                    payer_id: e.payer_id,
                    amount: e.amount,
                    method: e.method,
                    state: PaymentState::Pending,
                    provider_reference: None,
                    failure_reason: None,
                    created_at: e.occurred_at,
                    updated_at: e.occurred_at,
                },
            ),
            PaymentEvent::Completed(e) => self.touch(e.payment_id, e.occurred_at, |v| {
                v.state = PaymentState::Completed;
                v.provider_reference = e.provider_reference;
            })?,
            PaymentEvent::Failed(e) => self.touch(e.payment_id, e.occurred_at, |v| {
                v.state = PaymentState::Failed;
                v.failure_reason = Some(e.reason);
            })?,
            PaymentEvent::Refunded(e) => {
                self.touch(e.payment_id, e.occurred_at, |v| v.state = PaymentState::Refunded)?
            }
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    fn reset(&self) {
        self.store.clear();
        self.cursors.clear();
    }
}
