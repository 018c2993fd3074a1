//! Courier self-service: availability, earnings, wallet and payouts.

use std::sync::Arc;

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;

use miam_auth::permissions::delivery;
use miam_auth::{AccountCommand, SetCourierAvailability};
use miam_core::PayoutId;
use miam_delivery::{EarningsSummary, PayoutRecord, RequestPayout, WalletCommand};
use miam_infra::projections::AccountView;

use crate::app::dto::{self, AppJson, AppQuery, OptionalJson};
use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/me/availability", put(set_availability))
        .route("/me/earnings", get(earnings))
        .route("/me/wallet", get(wallet))
        .route("/me/payouts", get(list_payouts).post(request_payout))
}

pub async fn set_availability(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    AppJson(body): AppJson<dto::AvailabilityRequest>,
) -> ApiResult<Json<AccountView>> {
    let user_id = principal.user_id();
    let cmd = AccountCommand::SetCourierAvailability(SetCourierAvailability {
        user_id,
        available: body.available,
        occurred_at: Utc::now(),
    });
    let cmd = CmdAuth::new(cmd, [delivery::WORK]).authorize(&principal)?;
    services.account(user_id, cmd).await?;
    services.read().accounts.get(user_id).map(Json).ok_or_else(|| ApiError::not_found("account"))
}

pub async fn earnings(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    AppQuery(query): AppQuery<dto::EarningsQuery>,
) -> ApiResult<Json<EarningsSummary>> {
    require(&principal, &delivery::EARNINGS_READ)?;
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from >= to {
            return Err(ApiError::Validation("`from` must be before `to`".into()));
        }
    }
    let wallet = services.load_wallet(principal.user_id()).await?;
    Ok(Json(EarningsSummary::for_period(&wallet, query.from, query.to)))
}

pub async fn wallet(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
) -> ApiResult<impl IntoResponse> {
    require(&principal, &delivery::EARNINGS_READ)?;
    let wallet = services.load_wallet(principal.user_id()).await?;
    Ok(Json(json!({
        "courier_id": principal.user_id(),
        "available": wallet.available(),
        "pending": wallet.pending(),
        "paid_out": wallet.paid_out(),
        "lifetime_earnings": wallet.lifetime_earnings(),
        "minimum_payout": services.earnings.min_payout,
        "credits": wallet.credits(),
    })))
}

pub async fn list_payouts(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
) -> ApiResult<Json<Vec<PayoutRecord>>> {
    require(&principal, &delivery::EARNINGS_READ)?;
    let wallet = services.load_wallet(principal.user_id()).await?;
    let mut payouts = wallet.payouts().to_vec();
    payouts.reverse();
    Ok(Json(payouts))
}

pub async fn request_payout(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    OptionalJson(body): OptionalJson<dto::PayoutRequest>,
) -> ApiResult<impl IntoResponse> {
    let body = body.unwrap_or_default();
    let courier_id = principal.user_id();
    let payout_id = PayoutId::new();

    let cmd = WalletCommand::RequestPayout(RequestPayout {
        courier_id,
        payout_id,
        amount: body.amount,
        minimum: services.earnings.min_payout,
        occurred_at: Utc::now(),
    });
    let cmd = CmdAuth::new(cmd, [delivery::PAYOUT_REQUEST]).authorize(&principal)?;
    let wallet = services.wallet(courier_id, cmd).await?;

    let payout = wallet.payout(payout_id).cloned().ok_or_else(|| ApiError::not_found("payout"))?;
    Ok((StatusCode::CREATED, Json(payout)))
}
