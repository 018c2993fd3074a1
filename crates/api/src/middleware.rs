use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;

use miam_auth::{AccountStatus, JwtValidator};
use miam_infra::projections::AccountsProjection;

use crate::app::errors::ApiError;
use crate::context::PrincipalContext;

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
    pub accounts: Arc<AccountsProjection>,
}

/// Resolve the bearer token, if any, into a [`PrincipalContext`] (and its
/// [`JwtClaims`](miam_auth::JwtClaims) for `/auth/verify`).
///
/// Requests without an `Authorization` header pass through untouched; the
/// handlers that need a caller reject them. A header that is present but
/// malformed, expired or forged is a 401 everywhere.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(token) = extract_bearer(req.headers())? else {
        return Ok(next.run(req).await);
    };

    let claims = state.jwt.validate(token, Utc::now())?;

    let account = state
        .accounts
        .get(claims.sub)
        .ok_or_else(|| ApiError::Unauthenticated("account no longer exists".into()))?;
    if account.status == AccountStatus::Suspended {
        return Err(ApiError::forbidden("account is suspended"));
    }

    let principal = PrincipalContext::new(claims.sub, claims.email.clone(), account.role);
    req.extensions_mut().insert(principal);
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<Option<&str>, ApiError> {
    let Some(header) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let unauthenticated = || ApiError::Unauthenticated("malformed authorization header".into());

    let header = header.to_str().map_err(|_| unauthenticated())?;
    let token = header.strip_prefix("Bearer ").ok_or_else(unauthenticated)?.trim();
    if token.is_empty() {
        return Err(unauthenticated());
    }
    Ok(Some(token))
}
