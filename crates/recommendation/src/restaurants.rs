use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use miam_core::{GeoPoint, MenuItemId, Money, RestaurantId, UserId};

use crate::insight::{Insight, InsightError};
use crate::job::InsightJob;
use crate::scoring::{ScoreBreakdown, Weights, confidence_for};

pub const MAX_FAVOURITES: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PastOrderLine {
    pub item_id: MenuItemId,
    pub name: String,
    pub quantity: u32,
}

/// A non-cancelled order from the client's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PastOrder {
    pub restaurant_id: RestaurantId,
    pub cuisine: String,
    pub lines: Vec<PastOrderLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientHistory {
    pub client_id: UserId,
    pub location: Option<GeoPoint>,
    pub orders: Vec<PastOrder>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub item_id: MenuItemId,
    pub name: String,
    pub price: Money,
}

/// An open restaurant; `available_items` lists only items on sale right now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRestaurant {
    pub restaurant_id: RestaurantId,
    pub name: String,
    pub cuisine: String,
    pub location: GeoPoint,
    pub delivered_orders: u32,
    pub available_items: Vec<ItemSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationInput {
    pub history: ClientHistory,
    pub candidates: Vec<CandidateRestaurant>,
    pub delivery_radius_m: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRestaurant {
    pub restaurant_id: RestaurantId,
    pub name: String,
    pub cuisine: String,
    pub score: f64,
    pub distance_m: Option<u32>,
    pub breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavouriteItem {
    pub restaurant_id: RestaurantId,
    pub item_id: MenuItemId,
    pub name: String,
    pub price: Money,
    pub ordered_quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendations {
    pub restaurants: Vec<ScoredRestaurant>,
    pub favourite_items: Vec<FavouriteItem>,
}

/// Ranks open restaurants for one client.
#[derive(Debug, Clone)]
pub struct RestaurantRecommendationJob {
    input: RecommendationInput,
    limit: usize,
    weights: Weights,
}

impl RestaurantRecommendationJob {
    pub fn new(input: RecommendationInput) -> Self {
        Self { input, limit: 10, weights: Weights::default() }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_weights(mut self, weights: Weights) -> Self {
        self.weights = weights;
        self
    }

    pub fn recommend(&self) -> Result<Recommendations, InsightError> {
        if self.limit == 0 {
            return Err(InsightError::InvalidInput("limit must be at least 1".to_string()));
        }
        let w = &self.weights;
        let all = [w.cuisine_affinity, w.loyalty, w.popularity, w.proximity];
        if all.iter().any(|x| !x.is_finite() || *x < 0.0) {
            return Err(InsightError::InvalidInput(
                "weights must be finite and non-negative".to_string(),
            ));
        }

        let history = &self.input.history;
        let client_orders = history.orders.len() as u32;
        let mut by_cuisine: HashMap<String, u32> = HashMap::new();
        let mut by_restaurant: HashMap<RestaurantId, u32> = HashMap::new();
        for order in &history.orders {
            *by_cuisine.entry(order.cuisine.trim().to_lowercase()).or_default() += 1;
            *by_restaurant.entry(order.restaurant_id).or_default() += 1;
        }

        let candidates: Vec<_> =
            self.input.candidates.iter().filter(|c| !c.available_items.is_empty()).collect();
        let max_delivered = candidates.iter().map(|c| c.delivered_orders).max().unwrap_or(0);

        let mut restaurants: Vec<ScoredRestaurant> = candidates
            .iter()
            .filter_map(|c| {
                let distance_m = self.distance_to(c);
                if !self.within_radius(distance_m) {
                    return None;
                }
                let breakdown = ScoreBreakdown::compute(
                    by_cuisine.get(&c.cuisine.trim().to_lowercase()).copied().unwrap_or(0),
                    by_restaurant.get(&c.restaurant_id).copied().unwrap_or(0),
                    client_orders,
                    c.delivered_orders,
                    max_delivered,
                    distance_m,
                );
                Some(ScoredRestaurant {
                    restaurant_id: c.restaurant_id,
                    name: c.name.clone(),
                    cuisine: c.cuisine.clone(),
                    score: breakdown.score(w),
                    distance_m,
                    breakdown,
                })
            })
            .collect();
        restaurants.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
        restaurants.truncate(self.limit);

        Ok(Recommendations { restaurants, favourite_items: self.favourites() })
    }

    /// `None` when the client has no known location.
    fn distance_to(&self, c: &CandidateRestaurant) -> Option<u32> {
        self.input.history.location.map(|from| from.distance_m(&c.location))
    }

    fn within_radius(&self, distance_m: Option<u32>) -> bool {
        !distance_m.is_some_and(|d| d > self.input.delivery_radius_m)
    }

    fn favourites(&self) -> Vec<FavouriteItem> {
        let mut ordered: HashMap<(RestaurantId, MenuItemId), u32> = HashMap::new();
        for order in &self.input.history.orders {
            for line in &order.lines {
                *ordered.entry((order.restaurant_id, line.item_id)).or_default() += line.quantity;
            }
        }

        let mut favourites: Vec<FavouriteItem> = self
            .input
            .candidates
            .iter()
            .filter(|c| self.within_radius(self.distance_to(c)))
            .flat_map(|c| c.available_items.iter().map(move |item| (c.restaurant_id, item)))
            .filter_map(|(restaurant_id, item)| {
                let qty = ordered.get(&(restaurant_id, item.item_id)).copied()?;
                Some(FavouriteItem {
                    restaurant_id,
                    item_id: item.item_id,
                    name: item.name.clone(),
                    price: item.price,
                    ordered_quantity: qty,
                })
            })
            .collect();
        favourites.sort_by(|a, b| {
            b.ordered_quantity.cmp(&a.ordered_quantity).then_with(|| a.name.cmp(&b.name))
        });
        favourites.truncate(MAX_FAVOURITES);
        favourites
    }
}

impl InsightJob for RestaurantRecommendationJob {
    type Input = RecommendationInput;

    fn input(&self) -> &Self::Input {
        &self.input
    }

    fn run(&self) -> Result<Insight, InsightError> {
        let recs = self.recommend()?;
        let top = recs.restaurants.first().map(|r| r.score).unwrap_or(0.0);
        let confidence = confidence_for(self.input.history.orders.len());

        let explanation = match recs.restaurants.first() {
            Some(best) => format!(
                "ranked {} restaurant(s) from {} past order(s); best match is {} ({:.2})",
                recs.restaurants.len(),
                self.input.history.orders.len(),
                best.name,
                best.score
            ),
            None => "no open restaurant delivers to this address right now".to_string(),
        };

        Ok(Insight::new(top, confidence)
            .with_explanation(explanation)
            .with_metadata(json!({
                "kind": "recommendation.restaurants",
                "client_id": self.input.history.client_id,
                "restaurants": recs.restaurants,
                "favourite_items": recs.favourite_items,
            })))
    }
}
