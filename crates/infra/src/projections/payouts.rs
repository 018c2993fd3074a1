//! Cross-courier payout queue for admins. Balances live on the wallet itself.

use serde_json::Value as JsonValue;

use miam_core::PayoutId;
use miam_delivery::{PayoutRecord, PayoutResolved, PayoutStatus, WALLET_AGGREGATE, WalletEvent};
use miam_events::{EventEnvelope, Projection, ProjectionError, StreamCursors};

use crate::read_model::{InMemoryStore, KeyedStore};

pub type PayoutView = PayoutRecord;

pub struct PayoutsProjection<S = InMemoryStore<PayoutId, PayoutView>> {
    store: S,
    cursors: StreamCursors,
}

impl PayoutsProjection {
    pub fn in_memory() -> Self {
        Self::new(InMemoryStore::new())
    }
}

impl<S> PayoutsProjection<S>
where
    S: KeyedStore<PayoutId, PayoutView>,
{
    pub fn new(store: S) -> Self {
        Self { store, cursors: StreamCursors::new() }
    }

    /// Oldest request first.
    pub fn list(&self, status: Option<PayoutStatus>) -> Vec<PayoutView> {
        let mut out: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|p| status.is_none_or(|s| p.status == s))
            .collect();
        out.sort_by_key(|p| (p.requested_at, p.payout_id));
        out
    }

    fn resolve(&self, e: PayoutResolved, status: PayoutStatus) -> Result<(), ProjectionError> {
        let found = self.store.update(&e.payout_id, |p| {
            p.status = status;
            p.resolved_at = Some(e.occurred_at);
            p.note = e.note;
        });
        if found {
            Ok(())
        } else {
            let msg = format!("payout {} was never requested", e.payout_id);
            Err(ProjectionError::Inconsistent(msg))
        }
    }
}

impl<S> Projection for PayoutsProjection<S>
where
    S: KeyedStore<PayoutId, PayoutView>,
{
    fn name(&self) -> &'static str {
        "payouts"
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != WALLET_AGGREGATE || !self.cursors.should_apply(envelope)? {
            return Ok(());
        }
        let event: WalletEvent =
            envelope.decode().map_err(|e| ProjectionError::deserialize(envelope, e))?;

        match event {
            WalletEvent::Credited(_) => {}
            WalletEvent::PayoutRequested(e) => self.store.upsert(
                e.payout_id,
                PayoutRecord {
                    payout_id: e.payout_id,
                    courier_id: e.courier_id,
                    amount: e.amount,
                    status: PayoutStatus::Requested,
                    requested_at: e.occurred_at,
                    resolved_at: None,
                    note: None,
                },
            ),
            WalletEvent::PayoutSettled(e) => self.resolve(e, PayoutStatus::Settled)?,
            WalletEvent::PayoutRejected(e) => self.resolve(e, PayoutStatus::Rejected)?,
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    fn reset(&self) {
        self.store.clear();
        self.cursors.clear();
    }
}
