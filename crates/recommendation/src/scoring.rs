//! Weighted scoring of one candidate restaurant.
//!
//! Every feature is normalised to `[0, 1]` before weighting, so the final
//! score stays in `[0, 1]` as long as the weights sum to one.

use serde::{Deserialize, Serialize};

/// Distance at which proximity reaches zero.
pub const PROXIMITY_HORIZON_M: f64 = 10_000.0;
/// Visits after which loyalty is saturated.
pub const LOYALTY_CAP: u32 = 5;
/// Proximity used when the client has no known location.
pub const UNKNOWN_PROXIMITY: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub cuisine_affinity: f64,
    pub loyalty: f64,
    pub popularity: f64,
    pub proximity: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            cuisine_affinity: 0.35,
            loyalty: 0.25,
            popularity: 0.20,
            proximity: 0.20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub cuisine_affinity: f64,
    pub loyalty: f64,
    pub popularity: f64,
    pub proximity: f64,
}

impl ScoreBreakdown {
    /// `cuisine_orders` and `restaurant_orders` count the client's own orders;
    /// `delivered` and `max_delivered` are platform-wide.
    pub fn compute(
        cuisine_orders: u32,
        restaurant_orders: u32,
        client_orders: u32,
        delivered: u32,
        max_delivered: u32,
        distance_m: Option<u32>,
    ) -> Self {
        let ratio = |num: u32, den: u32| {
            if den == 0 { 0.0 } else { (f64::from(num) / f64::from(den)).min(1.0) }
        };
        let proximity = match distance_m {
            Some(d) => (1.0 - f64::from(d) / PROXIMITY_HORIZON_M).max(0.0),
            None => UNKNOWN_PROXIMITY,
        };
        Self {
            cuisine_affinity: ratio(cuisine_orders, client_orders),
            loyalty: ratio(restaurant_orders.min(LOYALTY_CAP), LOYALTY_CAP),
            popularity: ratio(delivered, max_delivered),
            proximity,
        }
    }

    pub fn score(&self, w: &Weights) -> f64 {
        w.cuisine_affinity * self.cuisine_affinity
            + w.loyalty * self.loyalty
            + w.popularity * self.popularity
            + w.proximity * self.proximity
    }
}

/// `min(1, n / 10)`, floored at 0.1.
pub fn confidence_for(history_len: usize) -> f64 {
    (history_len as f64 / 10.0).clamp(0.1, 1.0)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn regular_nearby_favourite_scores_high() {
        let b = ScoreBreakdown::compute(4, 4, 4, 10, 10, Some(1_000));
        assert_eq!(b.cuisine_affinity, 1.0);
        assert!((b.loyalty - 0.8).abs() < 1e-9);
        assert!((b.proximity - 0.9).abs() < 1e-9);
        let s = b.score(&Weights::default());
        assert!((s - (0.35 + 0.25 * 0.8 + 0.20 + 0.20 * 0.9)).abs() < 1e-9);
    }

    #[test]
    fn new_clients_fall_back_to_popularity_and_distance() {
        let b = ScoreBreakdown::compute(0, 0, 0, 3, 6, None);
        assert_eq!(b.cuisine_affinity, 0.0);
        assert_eq!(b.loyalty, 0.0);
        assert_eq!(b.popularity, 0.5);
        assert_eq!(b.proximity, UNKNOWN_PROXIMITY);
    }

    #[test]
    fn confidence_grows_with_history() {
        assert_eq!(confidence_for(0), 0.1);
        assert_eq!(confidence_for(5), 0.5);
        assert_eq!(confidence_for(40), 1.0);
    }

    proptest! {
        #[test]
        fn scores_stay_in_unit_interval(
            cuisine in 0u32..50,
            at_restaurant in 0u32..50,
            extra in 0u32..50,
            delivered in 0u32..1_000,
            more in 0u32..1_000,
            distance in proptest::option::of(0u32..30_000),
        ) {
            let client_orders = cuisine.max(at_restaurant) + extra;
            let b = ScoreBreakdown::compute(
                cuisine,
                at_restaurant,
                client_orders,
                delivered,
                delivered + more,
                distance,
            );
            let s = b.score(&Weights::default());
            prop_assert!((0.0..=1.0 + 1e-9).contains(&s));
        }
    }
}
