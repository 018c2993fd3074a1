//! `miam-events`: event mechanics shared by aggregates, infra and the API.
//!
//! Nothing in here knows about orders or couriers: it defines what an event
//! is, how it travels (envelopes over a bus), and the projection and policy
//! contracts that consume it.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;
pub mod policy;
pub mod projection;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use policy::Policy;
pub use projection::{Projection, ProjectionError, StreamCursors};
