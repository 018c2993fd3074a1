use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use miam_core::{AggregateId, ExpectedVersion};
use miam_events::EventEnvelope;

/// An event ready to be appended; the store assigns its sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl UncommittedEvent {
    /// Serialize a typed domain event, keeping the metadata consumers route on.
    pub fn from_typed<E>(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: miam_events::Event + Serialize,
    {
        let payload = serde_json::to_value(event).map_err(|e| {
            EventStoreError::InvalidAppend(format!("payload serialization failed: {e}"))
        })?;

        Ok(Self {
            event_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}

/// A persisted event.
///
/// `sequence_number` is the 1-based position inside the
/// `(aggregate_type, aggregate_id)` stream; `position` orders every event in
/// the store and drives replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub sequence_number: u64,
    pub position: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn to_envelope(&self) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            self.event_id,
            self.aggregate_id,
            self.aggregate_type.clone(),
            self.sequence_number,
            self.event_type.clone(),
            self.occurred_at,
            self.payload.clone(),
        )
    }
}

#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Append-only store of aggregate streams.
///
/// A stream is keyed by `(aggregate_type, aggregate_id)`: an order, its chat
/// thread and its delivery share one uuid but never one stream.
///
/// Implementations must check `ExpectedVersion` against the current stream
/// revision, assign sequence numbers `current + 1 ..` without gaps and
/// persist a batch atomically.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Events of one stream in sequence order; empty if it does not exist.
    async fn load_stream(
        &self,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Every event in commit order.
    async fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError>;
}

#[async_trait]
impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    async fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected_version).await
    }

    async fn load_stream(
        &self,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(aggregate_type, aggregate_id).await
    }

    async fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_all().await
    }
}

/// Every event of a batch must target the same stream.
pub(crate) fn batch_stream(
    events: &[UncommittedEvent],
) -> Result<Option<(String, AggregateId)>, EventStoreError> {
    let Some(first) = events.first() else {
        return Ok(None);
    };
    for (idx, e) in events.iter().enumerate() {
        if e.aggregate_id != first.aggregate_id || e.aggregate_type != first.aggregate_type {
            return Err(EventStoreError::InvalidAppend(format!(
                "batch mixes streams (index {idx})"
            )));
        }
    }
    Ok(Some((first.aggregate_type.clone(), first.aggregate_id)))
}
