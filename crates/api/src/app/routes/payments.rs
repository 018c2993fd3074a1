use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use miam_auth::permissions::payments;
use miam_infra::projections::PaymentView;

use crate::app::dto::{self, AppJson};
use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::parse_id;
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(initiate_payment).get(list_payments))
        .route("/:id", get(get_payment))
}

pub async fn initiate_payment(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    AppJson(body): AppJson<dto::InitiatePaymentRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&principal, &payments::INITIATE)?;
    let payment = services.initiate_payment(principal.user_id(), parse_id(&body.order_id)?).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

pub async fn list_payments(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
) -> ApiResult<Json<Vec<PaymentView>>> {
    require(&principal, &payments::READ)?;
    Ok(Json(services.read().payments.for_payer(principal.user_id())))
}

pub async fn get_payment(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult<Json<PaymentView>> {
    require(&principal, &payments::READ)?;
    let payment = services
        .read()
        .payments
        .get(parse_id(&id)?)
        .ok_or_else(|| ApiError::not_found("payment"))?;
    if payment.payer_id != principal.user_id() && !principal.is_admin() {
        return Err(ApiError::forbidden("not the payer of this payment"));
    }
    Ok(Json(payment))
}
