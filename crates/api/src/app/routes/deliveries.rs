use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use tracing::info;

use miam_auth::Role;
use miam_auth::permissions::delivery;
use miam_core::DeliveryId;
use miam_delivery::{AcceptDelivery, CourierAction, DeliveryCommand, DeliveryStatus};
use miam_infra::projections::DeliveryView;

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{CmdAuth, parse_id};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(my_deliveries))
        .route("/available", get(available_deliveries))
        .route("/:id", get(get_delivery))
        .route("/:id/accept", post(accept_delivery))
        .route("/:id/release", post(release_delivery))
        .route("/:id/pickup", post(pick_up_delivery))
        .route("/:id/complete", post(complete_delivery))
}

fn delivery_view(services: &AppServices, id: DeliveryId) -> ApiResult<DeliveryView> {
    services.read().deliveries.get(id).ok_or_else(|| ApiError::not_found("delivery"))
}

pub async fn my_deliveries(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
) -> ApiResult<Json<Vec<DeliveryView>>> {
    require(&principal, &delivery::WORK)?;
    Ok(Json(services.read().deliveries.for_courier(principal.user_id())))
}

pub async fn available_deliveries(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
) -> ApiResult<Json<Vec<DeliveryView>>> {
    require(&principal, &delivery::WORK)?;
    Ok(Json(services.read().deliveries.available()))
}

/// Visible to its courier, the order's client and restaurant owner, admins,
/// and to any courier while it is still on the jobs board.
pub async fn get_delivery(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeliveryView>> {
    let view = delivery_view(&services, parse_id(&id)?)?;
    let user_id = principal.user_id();

    let on_board = principal.role() == Role::Livreur && view.status == DeliveryStatus::Available;
    let involved = view.courier_id == Some(user_id)
        || services.read().orders.get(view.order_id).is_some_and(|o| o.involves(user_id));
    if principal.is_admin() || on_board || involved {
        Ok(Json(view))
    } else {
        Err(ApiError::forbidden("not allowed to view this delivery"))
    }
}

pub async fn accept_delivery(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeliveryView>> {
    let delivery_id = parse_id(&id)?;
    let courier_id = principal.user_id();
    let courier_available =
        services.read().accounts.get(courier_id).is_some_and(|account| account.available);

    let cmd = DeliveryCommand::Accept(AcceptDelivery {
        delivery_id,
        courier_id,
        courier_available,
        occurred_at: Utc::now(),
    });
    let cmd = CmdAuth::new(cmd, [delivery::WORK]).authorize(&principal)?;
    services.delivery(delivery_id, cmd).await?;
    info!(%delivery_id, %courier_id, "delivery accepted");
    delivery_view(&services, delivery_id).map(Json)
}

async fn courier_action(
    services: &AppServices,
    principal: &PrincipalContext,
    id: &str,
    make: fn(CourierAction) -> DeliveryCommand,
) -> ApiResult<Json<DeliveryView>> {
    let delivery_id = parse_id(id)?;
    let cmd = make(CourierAction {
        delivery_id,
        courier_id: principal.user_id(),
        occurred_at: Utc::now(),
    });
    let cmd = CmdAuth::new(cmd, [delivery::WORK]).authorize(principal)?;
    services.delivery(delivery_id, cmd).await?;
    delivery_view(services, delivery_id).map(Json)
}

pub async fn release_delivery(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeliveryView>> {
    courier_action(&services, &principal, &id, DeliveryCommand::Release).await
}

pub async fn pick_up_delivery(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeliveryView>> {
    courier_action(&services, &principal, &id, DeliveryCommand::PickUp).await
}

pub async fn complete_delivery(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeliveryView>> {
    courier_action(&services, &principal, &id, DeliveryCommand::Complete).await
}
