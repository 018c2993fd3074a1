use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use miam_auth::{Principal, Role};
use miam_core::{Actor, UserId};

use crate::app::errors::ApiError;

/// Authenticated caller, inserted by the auth middleware.
///
/// Extracting it from a request without a valid bearer token is a 401.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    user_id: UserId,
    email: String,
    role: Role,
}

impl PrincipalContext {
    pub fn new(user_id: UserId, email: String, role: Role) -> Self {
        Self { user_id, email, role }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    pub fn principal(&self) -> Principal {
        Principal::for_role(self.user_id, self.role)
    }

    /// The caller as seen by aggregates.
    pub fn actor(&self) -> Actor {
        if self.is_admin() { Actor::admin(self.user_id) } else { Actor::user(self.user_id) }
    }
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for PrincipalContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<PrincipalContext>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthenticated("missing bearer token".into()))
    }
}
