use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use miam_core::AggregateId;

use crate::EventEnvelope;

/// Builds a disposable read model from committed envelopes.
///
/// Implementations must be idempotent: an envelope whose sequence number has
/// already been applied is skipped, so replaying a stream or receiving a
/// duplicate from the bus leaves the read model unchanged.
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError>;

    /// Drop all state so the projection can be rebuilt from the store.
    fn reset(&self);
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("failed to deserialize {event_type}: {message}")]
    Deserialize { event_type: String, message: String },

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    /// The event refers to a row the projection never saw created.
    #[error("inconsistent read model: {0}")]
    Inconsistent(String),
}

impl ProjectionError {
    pub fn deserialize(envelope: &EventEnvelope<JsonValue>, err: serde_json::Error) -> Self {
        Self::Deserialize {
            event_type: envelope.event_type().to_string(),
            message: err.to_string(),
        }
    }
}

/// Last applied sequence number per stream.
#[derive(Debug, Default)]
pub struct StreamCursors {
    inner: RwLock<HashMap<(String, AggregateId), u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self, aggregate_type: &str, aggregate_id: AggregateId) -> u64 {
        self.inner
            .read()
            .ok()
            .and_then(|m| m.get(&(aggregate_type.to_string(), aggregate_id)).copied())
            .unwrap_or(0)
    }

    /// `Ok(true)` when the envelope is next in its stream, `Ok(false)` when
    /// it was already applied.
    ///
    /// A stream seen for the first time may start at any position, which
    /// lets a projection attach to a live bus without replaying history.
    pub fn should_apply(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<bool, ProjectionError> {
        let seq = envelope.sequence_number();
        let last = self.last(envelope.aggregate_type(), envelope.aggregate_id());
        if seq == 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(false);
        }
        if last != 0 && seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        Ok(true)
    }

    pub fn advance(&self, envelope: &EventEnvelope<JsonValue>) {
        if let Ok(mut m) = self.inner.write() {
            m.insert(
                (envelope.aggregate_type().to_string(), envelope.aggregate_id()),
                envelope.sequence_number(),
            );
        }
    }

    pub fn clear(&self) {
        if let Ok(mut m) = self.inner.write() {
            m.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    fn envelope(agg: AggregateId, seq: u64) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            agg,
            "test.stream",
            seq,
            "test.stream.touched",
            Utc::now(),
            JsonValue::Null,
        )
    }

    #[test]
    fn duplicates_are_skipped_and_gaps_rejected() {
        let cursors = StreamCursors::new();
        let agg = AggregateId::new();

        assert!(cursors.should_apply(&envelope(agg, 1)).unwrap());
        cursors.advance(&envelope(agg, 1));

        assert!(!cursors.should_apply(&envelope(agg, 1)).unwrap());
        assert!(cursors.should_apply(&envelope(agg, 2)).unwrap());
        assert_eq!(
            cursors.should_apply(&envelope(agg, 4)),
            Err(ProjectionError::NonMonotonicSequence { last: 1, found: 4 })
        );
    }

    #[test]
    fn zero_is_never_a_valid_sequence() {
        let cursors = StreamCursors::new();
        assert!(cursors.should_apply(&envelope(AggregateId::new(), 0)).is_err());
    }
}
