use serde_json::Value as JsonValue;

use crate::EventEnvelope;

/// Reacts to committed events by proposing follow-up actions.
///
/// A policy is pure: it reads an envelope and returns what should happen
/// next. Executing the actions (dispatching commands, sending
/// notifications) is the runner's job, and the runner decides how failures
/// are reported.
pub trait Policy: Send + Sync {
    type Action: Send + 'static;

    fn name(&self) -> &'static str;

    fn react(&self, envelope: &EventEnvelope<JsonValue>) -> Vec<Self::Action>;
}
