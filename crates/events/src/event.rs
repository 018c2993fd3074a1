use chrono::{DateTime, Utc};

/// A fact recorded by an aggregate.
///
/// `event_type` is a stable dotted name (`"ordering.order.confirmed"`) that
/// consumers route on without deserializing the payload.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn event_type(&self) -> &'static str;

    /// Schema version of the payload.
    fn version(&self) -> u32;

    /// Business time, carried by the command that produced the event.
    fn occurred_at(&self) -> DateTime<Utc>;
}
