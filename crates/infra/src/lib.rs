//! Infrastructure layer: event storage, command dispatch, read models and the
//! background reactor that chains the bounded contexts together.

pub mod dispatcher;
pub mod event_store;
pub mod fulfillment;
pub mod notifier;
pub mod platform;
pub mod projections;
pub mod reactor;
pub mod read_model;
pub mod realtime;

#[cfg(test)]
mod integration_tests;

pub use dispatcher::{CommandDispatcher, Committed, DispatchError, EnvelopeBus, SharedDispatcher};
pub use fulfillment::{FollowUp, FulfillmentPolicy};
pub use notifier::{Notifier, PendingNotification, order_reference};
pub use platform::{DEFAULT_REALTIME_CAPACITY, Platform, ReadModels};
pub use reactor::{Reactor, ReactorError};
pub use realtime::{RealtimeHub, RealtimeMessage, Room};
