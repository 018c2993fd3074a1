//! One error type for every handler, rendered as `{ "error", "message" }`.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use miam_auth::{AuthzError, PasswordError, TokenError};
use miam_core::DomainError;
use miam_infra::DispatchError;
use miam_payments::GatewayError;
use miam_recommendation::InsightError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    InvalidId(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Invariant(String),

    #[error("{0}")]
    Gateway(String),

    #[error("{0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound(format!("{what} not found"))
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::InvalidId(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Invariant(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Gateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::InvalidId(_) => "invalid_id",
            ApiError::Unauthenticated(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::Invariant(_) => "invariant_violation",
            ApiError::Gateway(_) => "payment_gateway_error",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Internal(detail) => {
                error!(error = %detail, "internal error");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": self.code(), "message": message }))).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => ApiError::Validation(msg),
            DomainError::InvalidId(msg) => ApiError::InvalidId(msg),
            DomainError::InvariantViolation(msg) => ApiError::Invariant(msg),
            DomainError::Conflict(msg) => ApiError::Conflict(msg),
            DomainError::NotFound => ApiError::NotFound("not found".into()),
            DomainError::Unauthorized => ApiError::forbidden("not allowed to act on this resource"),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Validation(msg) => ApiError::Validation(msg),
            DispatchError::InvariantViolation(msg) => ApiError::Invariant(msg),
            DispatchError::NotFound => ApiError::NotFound("not found".into()),
            DispatchError::Unauthorized => {
                ApiError::forbidden("not allowed to act on this resource")
            }
            DispatchError::Conflict(msg) | DispatchError::Concurrency(msg) => {
                ApiError::Conflict(msg)
            }
            DispatchError::Deserialize(msg) => ApiError::Internal(msg),
            DispatchError::Store(err) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(value: AuthzError) -> Self {
        ApiError::Forbidden(value.to_string())
    }
}

impl From<TokenError> for ApiError {
    fn from(value: TokenError) -> Self {
        match value {
            TokenError::Encode(msg) => ApiError::Internal(msg),
            TokenError::Invalid(_) | TokenError::Claims(_) => {
                ApiError::Unauthenticated("invalid or expired token".into())
            }
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(value: PasswordError) -> Self {
        match value {
            PasswordError::TooShort => ApiError::Validation(value.to_string()),
            PasswordError::CorruptHash(msg) | PasswordError::Hashing(msg) => {
                ApiError::Internal(msg)
            }
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(value: GatewayError) -> Self {
        ApiError::Gateway(value.to_string())
    }
}

impl From<InsightError> for ApiError {
    fn from(value: InsightError) -> Self {
        match value {
            InsightError::InvalidInput(msg) => ApiError::Validation(msg),
            InsightError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        ApiError::Validation(value.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(value: QueryRejection) -> Self {
        ApiError::Validation(value.body_text())
    }
}
