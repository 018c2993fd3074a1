//! Command execution pipeline.
//!
//! ```text
//! command
//!   -> lock the stream stripe
//!   -> load history, rehydrate
//!   -> handle (pure)
//!   -> append with ExpectedVersion::Exact(revision)
//!   -> apply inline projections
//!   -> publish envelopes to the bus
//! ```
//!
//! Inline projections run before the stripe is released, so the request that
//! issued a command can read its own writes. Everything reacting to the bus
//! (fulfillment, notifications, realtime) sees the events afterwards.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, instrument, warn};
use uuid::Uuid;

use miam_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use miam_events::{EventBus, EventEnvelope, InMemoryEventBus, Projection, Subscription};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

const STRIPES: usize = 64;

pub type EnvelopeBus = InMemoryEventBus<EventEnvelope<JsonValue>>;
pub type SharedDispatcher = Arc<CommandDispatcher>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("not found")]
    NotFound,

    #[error("unauthorized")]
    Unauthorized,

    /// Duplicate or state conflict decided by the aggregate.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The stream moved between load and append.
    #[error("concurrent modification: {0}")]
    Concurrency(String),

    #[error("failed to decode stored event: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                DispatchError::Validation(msg)
            }
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound => DispatchError::NotFound,
        }
    }
}

/// Result of a dispatch: the aggregate after the command and what was committed.
#[derive(Debug)]
pub struct Committed<A> {
    pub aggregate: A,
    pub events: Vec<StoredEvent>,
}

pub struct CommandDispatcher {
    store: Arc<dyn EventStore>,
    bus: Arc<EnvelopeBus>,
    projections: Vec<Arc<dyn Projection>>,
    stripes: Vec<Mutex<()>>,
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.projections.iter().map(|p| p.name()).collect();
        f.debug_struct("CommandDispatcher").field("projections", &names).finish_non_exhaustive()
    }
}

impl CommandDispatcher {
    pub fn new(store: Arc<dyn EventStore>, bus: Arc<EnvelopeBus>) -> Self {
        Self {
            store,
            bus,
            projections: Vec::new(),
            stripes: (0..STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Register a read model updated inside the commit section.
    pub fn with_projection(mut self, projection: Arc<dyn Projection>) -> Self {
        self.projections.push(projection);
        self
    }

    pub fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
        self.bus.subscribe()
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    fn stripe(&self, aggregate_type: &str, aggregate_id: AggregateId) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        aggregate_type.hash(&mut hasher);
        aggregate_id.hash(&mut hasher);
        &self.stripes[(hasher.finish() as usize) % self.stripes.len()]
    }

    /// Run one command against one stream.
    ///
    /// A command that decides no events commits nothing and returns the
    /// current state.
    #[instrument(skip(self, command, make_aggregate), fields(aggregate_id = %aggregate_id), err)]
    pub async fn dispatch<A>(
        &self,
        aggregate_type: &'static str,
        aggregate_id: AggregateId,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A + Send,
    ) -> Result<Committed<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError> + Send,
        A::Command: Send,
        A::Event: miam_events::Event + Serialize + DeserializeOwned + Send,
    {
        let _guard = self.stripe(aggregate_type, aggregate_id).lock().await;

        let history = self.store.load_stream(aggregate_type, aggregate_id).await?;
        validate_loaded_stream(aggregate_type, aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(history.len() as u64);

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;

        let decided = aggregate.handle(&command)?;
        if decided.is_empty() {
            return Ok(Committed { aggregate, events: vec![] });
        }

        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(aggregate_id, aggregate_type, Uuid::now_v7(), ev)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let committed = self.store.append(uncommitted, expected).await?;

        for ev in &decided {
            aggregate.apply(ev);
        }
        for stored in &committed {
            let envelope = stored.to_envelope();
            self.project(&envelope);
            if let Err(err) = self.bus.publish(envelope) {
                error!(event_type = %stored.event_type, error = ?err, "publish failed");
            }
        }

        Ok(Committed { aggregate, events: committed })
    }

    /// Rehydrate an aggregate without issuing a command.
    pub async fn load<A>(
        &self,
        aggregate_type: &'static str,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A + Send,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate + Send,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_type, aggregate_id).await?;
        validate_loaded_stream(aggregate_type, aggregate_id, &history)?;
        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Rebuild every inline projection from the full store. Returns the
    /// number of events replayed.
    #[instrument(skip(self), err)]
    pub async fn replay(&self) -> Result<usize, DispatchError> {
        for p in &self.projections {
            p.reset();
        }
        let all = self.store.load_all().await?;
        for stored in &all {
            self.project(&stored.to_envelope());
        }
        Ok(all.len())
    }

    fn project(&self, envelope: &EventEnvelope<JsonValue>) {
        for p in &self.projections {
            if let Err(err) = p.apply_envelope(envelope) {
                warn!(
                    projection = p.name(),
                    event_type = envelope.event_type(),
                    error = %err,
                    "projection rejected event"
                );
            }
        }
    }
}

fn validate_loaded_stream(
    aggregate_type: &str,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id || e.aggregate_type != aggregate_type {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "loaded stream contains a foreign event at index {idx}"
            ))));
        }
        if e.sequence_number != idx as u64 + 1 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "gap in loaded stream (index {idx}, sequence_number {})",
                e.sequence_number
            ))));
        }
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(format!("{}: {e}", stored.event_type)))?;
        aggregate.apply(&ev);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use miam_catalog::{CreateRestaurant, RESTAURANT_AGGREGATE, Restaurant, RestaurantCommand};
    use miam_core::{Address, GeoPoint, RestaurantId, UserId};

    use super::*;
    use crate::event_store::InMemoryEventStore;

    fn dispatcher() -> CommandDispatcher {
        CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), Arc::new(EnvelopeBus::new()))
    }

    fn create(restaurant_id: RestaurantId) -> RestaurantCommand {
        RestaurantCommand::Create(CreateRestaurant {
            restaurant_id,
            owner_id: UserId::new(),
            name: "Chez Fatou".into(),
            description: None,
            cuisine: "Senegalese".into(),
            address: Address {
                street: "12 rue Carnot".into(),
                city: "Dakar".into(),
                postal_code: None,
                location: Some(GeoPoint { lat: 14.69, lng: -17.44 }),
            },
            phone: None,
            prep_minutes: None,
            occurred_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn dispatch_appends_and_publishes() {
        let d = dispatcher();
        let mut sub = d.subscribe();
        let id = RestaurantId::new();

        let out = d
            .dispatch(RESTAURANT_AGGREGATE, id.into(), create(id), |a| Restaurant::empty(a.into()))
            .await
            .unwrap();
        assert_eq!(out.events.len(), 1);
        assert!(out.aggregate.exists());

        let env = sub.try_recv().unwrap();
        assert_eq!(env.event_type(), "catalog.restaurant.created");
        assert_eq!(env.sequence_number(), 1);

        let loaded: Restaurant = d
            .load(RESTAURANT_AGGREGATE, id.into(), |a| Restaurant::empty(a.into()))
            .await
            .unwrap();
        assert_eq!(loaded.name(), "Chez Fatou");
    }

    #[tokio::test]
    async fn domain_refusal_commits_nothing() {
        let d = dispatcher();
        let id = RestaurantId::new();
        d.dispatch(RESTAURANT_AGGREGATE, id.into(), create(id), |a| Restaurant::empty(a.into()))
            .await
            .unwrap();

        let err = d
            .dispatch(RESTAURANT_AGGREGATE, id.into(), create(id), |a| Restaurant::empty(a.into()))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Conflict(_)));
        assert_eq!(d.store().load_all().await.unwrap().len(), 1);
    }
}
