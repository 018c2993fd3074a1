use axum::Router;
use axum::routing::get;

pub mod admin;
pub mod auth;
pub mod common;
pub mod couriers;
pub mod deliveries;
pub mod notifications;
pub mod orders;
pub mod payments;
pub mod realtime;
pub mod recommendations;
pub mod restaurants;

/// Every endpoint, relative to `/api`.
pub fn router() -> Router {
    Router::new()
        .route("/realtime", get(realtime::stream))
        .nest("/auth", auth::router())
        .nest("/couriers", couriers::router())
        .nest("/restaurants", restaurants::router())
        .nest("/orders", orders::router())
        .nest("/payments", payments::router())
        .nest("/deliveries", deliveries::router())
        .nest("/notifications", notifications::router())
        .nest("/recommendations", recommendations::router())
        .nest("/admin", admin::router())
}
