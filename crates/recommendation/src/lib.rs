//! `miam-recommendation`: restaurant suggestions for clients.
//!
//! Jobs read snapshots assembled by the caller from read models and return
//! an [`Insight`]. Nothing here touches aggregates or emits domain events.

pub mod insight;
pub mod job;
pub mod restaurants;
pub mod scoring;

pub use insight::{Insight, InsightError};
pub use job::InsightJob;
pub use restaurants::{
    CandidateRestaurant, ClientHistory, FavouriteItem, PastOrder, PastOrderLine,
    RecommendationInput, Recommendations, RestaurantRecommendationJob, ScoredRestaurant,
    ItemSnapshot,
};
pub use scoring::{ScoreBreakdown, Weights, confidence_for};
