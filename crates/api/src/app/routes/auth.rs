use std::sync::Arc;

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;
use tracing::info;

use miam_auth::permissions::account;
use miam_auth::{
    AccountCommand, AccountStatus, ChangePassword, JwtClaims, RegistrationChannel, TokenIssuer,
    UpdateProfile, hash_password, normalize_email, verify_password,
};
use miam_infra::projections::AccountView;

use crate::app::dto::{self, AppJson};
use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::CmdAuth;
use crate::app::services::{AppServices, NewAccount};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/verify", get(verify))
        .route("/me", get(me).patch(update_me))
        .route("/change-password", post(change_password))
}

fn issue(services: &AppServices, user: AccountView) -> ApiResult<dto::AuthResponse> {
    let (token, _) = services.jwt.issue(user.user_id, &user.email, user.role, Utc::now())?;
    Ok(dto::AuthResponse { token, user })
}

pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    AppJson(body): AppJson<dto::RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let profile = body.profile()?;
    let user = services
        .register_account(NewAccount {
            email: body.email,
            password: body.password,
            full_name: body.full_name,
            phone: body.phone,
            profile,
            channel: RegistrationChannel::SelfService,
        })
        .await?;
    info!(user_id = %user.user_id, role = %user.role, "account registered");
    Ok((StatusCode::CREATED, Json(issue(&services, user)?)))
}

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    AppJson(body): AppJson<dto::LoginRequest>,
) -> ApiResult<Json<dto::AuthResponse>> {
    let bad_credentials = || ApiError::Unauthenticated("invalid email or password".into());

    let email = normalize_email(&body.email).map_err(|_| bad_credentials())?;
    let user_id = services.read().accounts.find_by_email(&email).ok_or_else(bad_credentials)?;
    let account = services.load_account(user_id).await?;

    let stored = account.password_hash.clone();
    let candidate = body.password;
    let matches = tokio::task::spawn_blocking(move || verify_password(&stored, &candidate))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    if !matches {
        return Err(bad_credentials());
    }
    if account.status == AccountStatus::Suspended {
        return Err(ApiError::forbidden("account is suspended"));
    }

    let user =
        services.read().accounts.get(user_id).ok_or_else(|| ApiError::not_found("account"))?;
    Ok(Json(issue(&services, user)?))
}

pub async fn verify(
    principal: PrincipalContext,
    Extension(claims): Extension<JwtClaims>,
    Extension(services): Extension<Arc<AppServices>>,
) -> ApiResult<impl IntoResponse> {
    let user = services
        .read()
        .accounts
        .get(principal.user_id())
        .ok_or_else(|| ApiError::not_found("account"))?;
    Ok(Json(json!({ "valid": true, "claims": claims, "user": user })))
}

pub async fn me(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
) -> ApiResult<Json<AccountView>> {
    services
        .read()
        .accounts
        .get(principal.user_id())
        .map(Json)
        .ok_or_else(|| ApiError::not_found("account"))
}

pub async fn update_me(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    AppJson(body): AppJson<dto::UpdateProfileRequest>,
) -> ApiResult<Json<AccountView>> {
    let user_id = principal.user_id();
    let cmd = AccountCommand::UpdateProfile(UpdateProfile {
        user_id,
        full_name: body.full_name,
        phone: body.phone,
        default_address: body.default_address,
        company_name: body.company_name,
        vehicle: body.vehicle,
        occurred_at: Utc::now(),
    });
    let cmd = CmdAuth::new(cmd, [account::PROFILE_UPDATE]).authorize(&principal)?;
    services.account(user_id, cmd).await?;
    me(principal, Extension(services)).await
}

pub async fn change_password(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    AppJson(body): AppJson<dto::ChangePasswordRequest>,
) -> ApiResult<StatusCode> {
    let user_id = principal.user_id();
    let account = services.load_account(user_id).await?;

    let stored = account.password_hash;
    let (current, new) = (body.current_password, body.new_password);
    let new_password_hash = tokio::task::spawn_blocking(move || {
        if !verify_password(&stored, &current)? {
            return Ok(None);
        }
        hash_password(&new).map(Some)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??
    .ok_or_else(|| ApiError::Validation("current password is incorrect".into()))?;

    let cmd = AccountCommand::ChangePassword(ChangePassword {
        user_id,
        new_password_hash,
        occurred_at: Utc::now(),
    });
    let cmd = CmdAuth::new(cmd, [account::PROFILE_UPDATE]).authorize(&principal)?;
    services.account(user_id, cmd).await?;
    Ok(StatusCode::NO_CONTENT)
}
