use crate::insight::{Insight, InsightError};

/// A unit of recommendation work over a caller-provided snapshot.
///
/// Inputs come from projections; the job stays storage-agnostic and must
/// not mutate domain state.
pub trait InsightJob: Send + Sync + 'static {
    type Input: Send + Sync + 'static;

    fn input(&self) -> &Self::Input;

    fn run(&self) -> Result<Insight, InsightError>;
}
