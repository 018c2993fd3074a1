use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use miam_core::{AggregateId, ExpectedVersion};

use super::store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent, batch_stream};

type StreamKey = (String, AggregateId);

#[derive(Debug, Default)]
struct Inner {
    /// Indexes into `log`, per stream.
    streams: HashMap<StreamKey, Vec<usize>>,
    log: Vec<StoredEvent>,
}

/// Append-only store held in process memory. Lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.log.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some(key) = batch_stream(&events)? else {
            return Ok(vec![]);
        };

        let mut inner = self
            .inner
            .write()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;
        let Inner { streams, log } = &mut *inner;

        let indexes = streams.entry(key).or_default();
        let current = indexes.len() as u64;
        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        let mut committed = Vec::with_capacity(events.len());
        for (offset, e) in events.into_iter().enumerate() {
            let stored = StoredEvent {
                event_id: e.event_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: current + offset as u64 + 1,
                position: log.len() as u64 + 1,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            };
            indexes.push(log.len());
            log.push(stored.clone());
            committed.push(stored);
        }

        Ok(committed)
    }

    async fn load_stream(
        &self,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        let key = (aggregate_type.to_string(), aggregate_id);
        Ok(inner
            .streams
            .get(&key)
            .map(|idx| idx.iter().map(|&i| inner.log[i].clone()).collect())
            .unwrap_or_default())
    }

    async fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;
        Ok(inner.log.clone())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    fn event(aggregate_type: &str, aggregate_id: AggregateId) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type: format!("{aggregate_type}.touched"),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: json!({}),
        }
    }

    #[tokio::test]
    async fn sequences_are_per_stream_and_positions_global() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();

        let batch = vec![event("ordering.order", id), event("ordering.order", id)];
        let a = store.append(batch, ExpectedVersion::Exact(0)).await.unwrap();
        let b = store
            .append(vec![event("ordering.chat", id)], ExpectedVersion::Exact(0))
            .await
            .unwrap();

        assert_eq!(a[1].sequence_number, 2);
        assert_eq!(b[0].sequence_number, 1);
        assert_eq!(b[0].position, 3);
        assert_eq!(store.load_stream("ordering.order", id).await.unwrap().len(), 2);
        assert_eq!(store.load_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn stale_expectation_is_a_concurrency_error() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store.append(vec![event("t", id)], ExpectedVersion::Exact(0)).await.unwrap();

        let err = store.append(vec![event("t", id)], ExpectedVersion::Exact(0)).await.unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn mixed_batches_are_refused() {
        let store = InMemoryEventStore::new();
        let batch = vec![event("t", AggregateId::new()), event("t", AggregateId::new())];
        let err = store.append(batch, ExpectedVersion::Any).await.unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidAppend(_)));
        assert!(store.is_empty());
    }
}
