//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: platform wiring (event store, dispatcher, read models, reactor)
//! - `routes/`: HTTP routes + handlers (one file per domain area)
//! - `dto.rs`: request DTOs and extractors
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;
use tracing::info;

use crate::config::AppConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs` and the
/// black-box tests).
///
/// Rebuilds the read models from the store and starts the background
/// reactor before returning.
pub async fn build_app(config: &AppConfig) -> anyhow::Result<Router> {
    let services = Arc::new(services::build_services(config).await?);

    let reactor = services.platform.reactor(services.gateway.clone());
    reactor.spawn();
    info!("fulfillment reactor spawned");

    let auth_state = middleware::AuthState {
        jwt: services.jwt.clone(),
        accounts: services.read().accounts.clone(),
    };

    // Authentication is resolved on every route; handlers that need a
    // caller extract `PrincipalContext` and reject anonymous requests.
    let api = routes::router().layer(
        ServiceBuilder::new()
            .layer(axum::middleware::from_fn_with_state(auth_state, middleware::auth_middleware))
            .layer(Extension(services)),
    );

    Ok(Router::new().nest("/api", api))
}
