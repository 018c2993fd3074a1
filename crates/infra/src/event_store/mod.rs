//! Append-only event store boundary.
//!
//! The in-memory store backs tests and single-process runs; the Postgres
//! store (feature `postgres`) survives restarts.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod store;

pub use in_memory::InMemoryEventStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresEventStore;
pub use store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
