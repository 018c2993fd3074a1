use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;
use tracing::info;

use miam_auth::permissions::admin;
use miam_auth::{AccountCommand, ActivateAccount, Role, SuspendAccount};
use miam_core::{Money, PayoutId, UserId};
use miam_delivery::{PayoutRecord, PayoutStatus, RejectPayout, SettlePayout, WalletCommand};
use miam_infra::projections::{AccountView, OrderScope, RestaurantFilter};
use miam_ordering::OrderStatus;

use crate::app::dto::{self, AppQuery, OptionalJson};
use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{CmdAuth, parse_id};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:id/suspend", post(suspend_user))
        .route("/users/:id/activate", post(activate_user))
        .route("/stats", get(stats))
        .route("/payouts", get(list_payouts))
        .route("/payouts/:courier_id/:payout_id/settle", post(settle_payout))
        .route("/payouts/:courier_id/:payout_id/reject", post(reject_payout))
}

pub async fn list_users(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    AppQuery(query): AppQuery<dto::UserQuery>,
) -> ApiResult<Json<Vec<AccountView>>> {
    require(&principal, &admin::USERS_READ)?;
    let role = query.role.as_deref().map(str::parse::<Role>).transpose()?;
    Ok(Json(services.read().accounts.list(role)))
}

pub async fn suspend_user(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    OptionalJson(body): OptionalJson<dto::SuspendRequest>,
) -> ApiResult<Json<AccountView>> {
    let user_id: UserId = parse_id(&id)?;
    if user_id == principal.user_id() {
        return Err(ApiError::Invariant("admins cannot suspend themselves".into()));
    }
    let reason = body
        .and_then(|b| b.reason)
        .unwrap_or_else(|| "suspended by an administrator".to_string());
    let cmd = AccountCommand::Suspend(SuspendAccount { user_id, reason, occurred_at: Utc::now() });
    let cmd = CmdAuth::new(cmd, [admin::USERS_MANAGE]).authorize(&principal)?;
    services.account(user_id, cmd).await?;
    info!(%user_id, by = %principal.user_id(), "account suspended");
    services.read().accounts.get(user_id).map(Json).ok_or_else(|| ApiError::not_found("account"))
}

pub async fn activate_user(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult<Json<AccountView>> {
    let user_id: UserId = parse_id(&id)?;
    let cmd = AccountCommand::Activate(ActivateAccount { user_id, occurred_at: Utc::now() });
    let cmd = CmdAuth::new(cmd, [admin::USERS_MANAGE]).authorize(&principal)?;
    services.account(user_id, cmd).await?;
    services.read().accounts.get(user_id).map(Json).ok_or_else(|| ApiError::not_found("account"))
}

/// Platform dashboard: users, restaurants, orders and platform revenue.
pub async fn stats(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
) -> ApiResult<impl IntoResponse> {
    require(&principal, &admin::STATS_READ)?;
    let read = services.read();

    let accounts = &read.accounts;
    let users = json!({
        "clients": accounts.count_by_role(Role::Client),
        "restaurateurs": accounts.count_by_role(Role::Restaurateur),
        "livreurs": accounts.count_by_role(Role::Livreur),
        "admins": accounts.count_by_role(Role::Admin),
    });

    let all_restaurants = read.restaurants.list(&RestaurantFilter::default());
    let open_restaurants = all_restaurants.iter().filter(|r| r.is_open).count();

    let orders = read.orders.stats();
    let commission = services.earnings.commission_on(orders.delivered_subtotal);
    let delivery_cut: Money = read
        .orders
        .list(OrderScope::All, Some(OrderStatus::Delivered))
        .iter()
        .map(|o| o.delivery.delivery_fee.checked_sub(o.delivery.courier_earning))
        .map(|cut| cut.unwrap_or(Money::ZERO))
        .sum();

    let pending = read.payouts.list(Some(PayoutStatus::Requested));
    let pending_amount: Money = pending.iter().map(|p| p.amount).sum();

    Ok(Json(json!({
        "users": users,
        "restaurants": { "total": all_restaurants.len(), "open": open_restaurants },
        "orders": orders,
        "revenue": {
            "commission": commission,
            "delivery_cut": delivery_cut,
            "total": commission + delivery_cut,
        },
        "payouts": { "pending_count": pending.len(), "pending_amount": pending_amount },
    })))
}

pub async fn list_payouts(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    AppQuery(query): AppQuery<dto::PayoutQuery>,
) -> ApiResult<Json<Vec<PayoutRecord>>> {
    require(&principal, &admin::PAYOUTS_MANAGE)?;
    Ok(Json(services.read().payouts.list(query.status)))
}

async fn resolve_payout(
    services: &AppServices,
    principal: &PrincipalContext,
    courier_id: UserId,
    cmd: WalletCommand,
    payout_id: PayoutId,
) -> ApiResult<Json<PayoutRecord>> {
    let cmd = CmdAuth::new(cmd, [admin::PAYOUTS_MANAGE]).authorize(principal)?;
    let wallet = services.wallet(courier_id, cmd).await?;
    info!(%courier_id, %payout_id, by = %principal.user_id(), "payout resolved");
    wallet.payout(payout_id).cloned().map(Json).ok_or_else(|| ApiError::not_found("payout"))
}

pub async fn settle_payout(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    Path((courier_id, payout_id)): Path<(String, String)>,
    OptionalJson(body): OptionalJson<dto::SettlePayoutRequest>,
) -> ApiResult<Json<PayoutRecord>> {
    let (courier_id, payout_id) = (parse_id(&courier_id)?, parse_id(&payout_id)?);
    let cmd = WalletCommand::SettlePayout(SettlePayout {
        courier_id,
        payout_id,
        reference: body.and_then(|b| b.reference),
        occurred_at: Utc::now(),
    });
    resolve_payout(&services, &principal, courier_id, cmd, payout_id).await
}

pub async fn reject_payout(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    Path((courier_id, payout_id)): Path<(String, String)>,
    OptionalJson(body): OptionalJson<dto::RejectPayoutRequest>,
) -> ApiResult<Json<PayoutRecord>> {
    let (courier_id, payout_id) = (parse_id(&courier_id)?, parse_id(&payout_id)?);
    let reason = body
        .and_then(|b| b.reason)
        .unwrap_or_else(|| "rejected by an administrator".to_string());
    let cmd = WalletCommand::RejectPayout(RejectPayout {
        courier_id,
        payout_id,
        reason,
        occurred_at: Utc::now(),
    });
    resolve_payout(&services, &principal, courier_id, cmd, payout_id).await
}
