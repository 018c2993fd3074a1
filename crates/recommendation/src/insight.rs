use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Output of a recommendation job.
///
/// An insight is shown to the user as is; it is never replayed into an
/// aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    /// Best candidate score, in `[0, 1]`.
    pub score: f64,

    /// How much history backed the result, in `[0.1, 1]`.
    pub confidence: f64,

    pub explanation: Option<String>,

    /// Job-specific payload (`kind` names the job).
    pub metadata: JsonValue,
}

impl Insight {
    pub fn new(score: f64, confidence: f64) -> Self {
        Self {
            score,
            confidence,
            explanation: None,
            metadata: JsonValue::Null,
        }
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Error)]
pub enum InsightError {
    #[error("invalid job input: {0}")]
    InvalidInput(String),

    #[error("internal error: {0}")]
    Internal(String),
}
