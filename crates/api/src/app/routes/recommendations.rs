//! Personalised restaurant suggestions for clients, computed from read
//! models on every request.

use std::sync::Arc;

use axum::extract::Extension;
use axum::routing::get;
use axum::{Json, Router};

use miam_auth::RoleProfile;
use miam_auth::permissions::recommendations;
use miam_core::UserId;
use miam_infra::ReadModels;
use miam_infra::projections::{OrderScope, RestaurantFilter};
use miam_ordering::OrderStatus;
use miam_recommendation::{
    CandidateRestaurant, ClientHistory, Insight, InsightJob, ItemSnapshot, PastOrder,
    PastOrderLine, RecommendationInput, RestaurantRecommendationJob,
};

use crate::app::dto::{self, AppQuery};
use crate::app::errors::ApiResult;
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::PrincipalContext;

const DEFAULT_LIMIT: usize = 5;
const MAX_LIMIT: usize = 50;

pub fn router() -> Router {
    Router::new().route("/", get(recommend))
}

pub async fn recommend(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    AppQuery(query): AppQuery<dto::RecommendationQuery>,
) -> ApiResult<Json<Insight>> {
    require(&principal, &recommendations::READ)?;
    let input = snapshot(services.read(), principal.user_id(), services.earnings.delivery_radius_m);
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let insight = RestaurantRecommendationJob::new(input).with_limit(limit).run()?;
    Ok(Json(insight))
}

fn snapshot(read: &ReadModels, client_id: UserId, delivery_radius_m: u32) -> RecommendationInput {
    let orders = read
        .orders
        .list(OrderScope::Client(client_id), None)
        .into_iter()
        .filter(|o| o.status != OrderStatus::Cancelled)
        .map(|o| PastOrder {
            restaurant_id: o.restaurant_id,
            cuisine: read.restaurants.get(o.restaurant_id).map(|r| r.cuisine).unwrap_or_default(),
            lines: o
                .lines
                .into_iter()
                .map(|l| PastOrderLine { item_id: l.item_id, name: l.name, quantity: l.quantity })
                .collect(),
        })
        .collect();

    let location = read.accounts.get(client_id).and_then(|account| match account.profile {
        RoleProfile::Client { default_address } => default_address.and_then(|a| a.location),
        _ => None,
    });

    let delivered = read.orders.delivered_by_restaurant();
    let open = RestaurantFilter { open: Some(true), ..RestaurantFilter::default() };
    let candidates = read
        .restaurants
        .list(&open)
        .into_iter()
        .filter_map(|r| {
            let location = r.address.location?;
            let available_items: Vec<_> = r
                .available_items()
                .map(|i| ItemSnapshot { item_id: i.id, name: i.name.clone(), price: i.price })
                .collect();
            if available_items.is_empty() {
                return None;
            }
            Some(CandidateRestaurant {
                restaurant_id: r.restaurant_id,
                delivered_orders: delivered.get(&r.restaurant_id).copied().unwrap_or(0),
                name: r.name,
                cuisine: r.cuisine,
                location,
                available_items,
            })
        })
        .collect();

    RecommendationInput {
        history: ClientHistory { client_id, location, orders },
        candidates,
        delivery_radius_m,
    }
}
