use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use tracing::info;

use miam_auth::Role;
use miam_auth::permissions::ordering;
use miam_core::{Money, MessageId, OrderId};
use miam_infra::projections::{OrderScope, OrderView};
use miam_ordering::{
    CancelOrder, ChatMessage, DeliveryTerms, OrderChatCommand, OrderCommand, OrderTransition,
    PlaceOrder, PostMessage, price_lines,
};

use crate::app::dto::{self, AppJson, AppQuery, OptionalJson};
use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{CmdAuth, parse_id};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(place_order).get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/confirm", post(confirm_order))
        .route("/:id/prepare", post(start_preparing))
        .route("/:id/ready", post(mark_ready))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/messages", get(list_messages).post(post_message))
}

fn order_view(services: &AppServices, id: OrderId) -> ApiResult<OrderView> {
    services.read().orders.get(id).ok_or_else(|| ApiError::not_found("order"))
}

/// The order, if the caller takes part in it or is an admin.
pub(crate) fn visible_order(
    services: &AppServices,
    principal: &PrincipalContext,
    id: OrderId,
) -> ApiResult<OrderView> {
    let order = order_view(services, id)?;
    if principal.is_admin() || order.involves(principal.user_id()) {
        Ok(order)
    } else {
        Err(ApiError::forbidden("not a participant of this order"))
    }
}

pub async fn place_order(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    AppJson(body): AppJson<dto::PlaceOrderRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&principal, &ordering::PLACE)?;

    let restaurant_id = parse_id(&body.restaurant_id)?;
    let restaurant = services.load_restaurant(restaurant_id).await?;
    let priced = price_lines(&restaurant, &body.items)?;

    let pickup = restaurant.address().cloned().ok_or_else(|| ApiError::not_found("restaurant"))?;
    let dropoff = body.delivery_address.normalized()?;
    let distance_m = pickup.require_location()?.distance_m(&dropoff.require_location()?);
    let quote = services.earnings.quote(distance_m)?;

    let order_id = OrderId::new();
    let cmd = OrderCommand::Place(PlaceOrder {
        order_id,
        client_id: principal.user_id(),
        restaurant_id,
        owner_id: restaurant.owner_id(),
        lines: priced.lines,
        delivery: DeliveryTerms {
            pickup,
            dropoff,
            distance_m,
            delivery_fee: quote.delivery_fee,
            courier_earning: quote.courier_earning,
            tip: body.tip.unwrap_or(Money::ZERO),
        },
        payment_method: body.payment_method,
        notes: body.notes,
        occurred_at: Utc::now(),
    });
    let cmd = CmdAuth::new(cmd, [ordering::PLACE]).authorize(&principal)?;
    services.order(order_id, cmd).await?;

    let order = order_view(&services, order_id)?;
    info!(%order_id, total = %order.total, "order placed");
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn list_orders(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    AppQuery(query): AppQuery<dto::OrderQuery>,
) -> ApiResult<Json<Vec<OrderView>>> {
    require(&principal, &ordering::READ)?;
    let user_id = principal.user_id();
    let scope = match principal.role() {
        Role::Client => OrderScope::Client(user_id),
        Role::Restaurateur => OrderScope::Owner(user_id),
        Role::Livreur => OrderScope::Courier(user_id),
        Role::Admin => OrderScope::All,
    };
    Ok(Json(services.read().orders.list(scope, query.status)))
}

pub async fn get_order(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult<Json<OrderView>> {
    require(&principal, &ordering::READ)?;
    visible_order(&services, &principal, parse_id(&id)?).map(Json)
}

async fn transition(
    services: &AppServices,
    principal: &PrincipalContext,
    id: &str,
    make: fn(OrderTransition) -> OrderCommand,
) -> ApiResult<Json<OrderView>> {
    let order_id = parse_id(id)?;
    let cmd = make(OrderTransition { order_id, actor: principal.actor(), occurred_at: Utc::now() });
    let cmd = CmdAuth::new(cmd, [ordering::FULFIL]).authorize(principal)?;
    services.order(order_id, cmd).await?;
    order_view(services, order_id).map(Json)
}

pub async fn confirm_order(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult<Json<OrderView>> {
    transition(&services, &principal, &id, OrderCommand::Confirm).await
}

pub async fn start_preparing(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult<Json<OrderView>> {
    transition(&services, &principal, &id, OrderCommand::StartPreparing).await
}

pub async fn mark_ready(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult<Json<OrderView>> {
    transition(&services, &principal, &id, OrderCommand::MarkReady).await
}

pub async fn cancel_order(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    OptionalJson(body): OptionalJson<dto::CancelRequest>,
) -> ApiResult<Json<OrderView>> {
    let order_id = parse_id(&id)?;
    let body = body.unwrap_or_default();
    let cmd = OrderCommand::Cancel(CancelOrder {
        order_id,
        actor: principal.actor(),
        reason: body.reason,
        occurred_at: Utc::now(),
    });
    let cmd = CmdAuth::new(cmd, [ordering::CANCEL]).authorize(&principal)?;
    services.order(order_id, cmd).await?;
    info!(%order_id, by = %principal.role(), "order cancelled");
    order_view(&services, order_id).map(Json)
}

pub async fn list_messages(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    require(&principal, &ordering::CHAT)?;
    let order = visible_order(&services, &principal, parse_id(&id)?)?;
    let chat = services.load_chat(order.order_id).await?;
    Ok(Json(chat.messages().to_vec()))
}

pub async fn post_message(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    AppJson(body): AppJson<dto::PostMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let order = visible_order(&services, &principal, parse_id(&id)?)?;
    let message_id = MessageId::new();
    let cmd = OrderChatCommand::Post(PostMessage {
        order_id: order.order_id,
        message_id,
        author_id: principal.user_id(),
        body: body.body,
        occurred_at: Utc::now(),
    });
    let cmd = CmdAuth::new(cmd, [ordering::CHAT]).authorize(&principal)?;
    let chat = services.chat(order.order_id, cmd).await?;
    let message = chat
        .messages()
        .iter()
        .find(|m| m.message_id == message_id)
        .cloned()
        .ok_or_else(|| ApiError::not_found("message"))?;
    Ok((StatusCode::CREATED, Json(message)))
}
