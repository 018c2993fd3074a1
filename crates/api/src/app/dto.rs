//! Request bodies and query strings, plus the extractors that turn axum's
//! rejections into `ApiError`s.

use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, Request};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use miam_auth::{Role, RoleProfile, Vehicle};
use miam_core::{Address, Money};
use miam_delivery::PayoutStatus;
use miam_infra::projections::AccountView;
use miam_ordering::{LineRequest, OrderStatus, PaymentMethod};

use crate::app::errors::{ApiError, ApiResult};

/// `axum::Json` with our error body on rejection.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct AppJson<T>(pub T);

/// A JSON body that may be left out. An empty body is `None`; anything else
/// must parse, or the request is rejected like `AppJson` would reject it.
pub struct OptionalJson<T>(pub Option<T>);

#[axum::async_trait]
impl<T, S> FromRequest<S> for OptionalJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::Validation(rejection.body_text()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(None));
        }
        let axum::Json(value) = axum::Json::<T>::from_bytes(&bytes)?;
        Ok(Self(Some(value)))
    }
}

/// `axum::extract::Query` with our error body on rejection.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct AppQuery<T>(pub T);

// -------------------------
// Auth
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub role: String,
    #[serde(default)]
    pub default_address: Option<Address>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub vehicle: Option<Vehicle>,
}

impl RegisterRequest {
    /// Role plus the profile fields that role carries.
    pub fn profile(&self) -> ApiResult<RoleProfile> {
        let role: Role = self.role.parse()?;
        Ok(match role {
            Role::Client => RoleProfile::Client { default_address: self.default_address.clone() },
            Role::Restaurateur => {
                RoleProfile::Restaurateur { company_name: self.company_name.clone() }
            }
            Role::Livreur => {
                let vehicle = self.vehicle.ok_or_else(|| {
                    ApiError::Validation("vehicle is required for couriers".into())
                })?;
                RoleProfile::Livreur { vehicle }
            }
            Role::Admin => {
                return Err(ApiError::Validation("admin accounts cannot self-register".into()));
            }
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: AccountView,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub default_address: Option<Address>,
    pub company_name: Option<String>,
    pub vehicle: Option<Vehicle>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

// -------------------------
// Couriers
// -------------------------

#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    pub available: bool,
}

#[derive(Debug, Deserialize)]
pub struct EarningsQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PayoutRequest {
    /// Defaults to the whole available balance.
    pub amount: Option<Money>,
}

// -------------------------
// Restaurants
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RestaurantQuery {
    pub cuisine: Option<String>,
    pub open: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRestaurantRequest {
    pub name: String,
    pub description: Option<String>,
    pub cuisine: String,
    pub address: Address,
    pub phone: Option<String>,
    pub prep_minutes: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRestaurantRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub cuisine: Option<String>,
    pub address: Option<Address>,
    pub phone: Option<String>,
    pub prep_minutes: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct AddMenuItemRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: Money,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMenuItemRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Money>,
    pub category: Option<String>,
}

// -------------------------
// Orders
// -------------------------

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub restaurant_id: String,
    pub items: Vec<LineRequest>,
    pub delivery_address: Address,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub tip: Option<Money>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub body: String,
}

// -------------------------
// Payments
// -------------------------

#[derive(Debug, Deserialize)]
pub struct InitiatePaymentRequest {
    pub order_id: String,
}

// -------------------------
// Notifications
// -------------------------

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread: bool,
}

// -------------------------
// Recommendations
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    pub limit: Option<usize>,
}

// -------------------------
// Admin
// -------------------------

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SuspendRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PayoutQuery {
    pub status: Option<PayoutStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SettlePayoutRequest {
    pub reference: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectPayoutRequest {
    pub reason: Option<String>,
}

// -------------------------
// Realtime
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RealtimeQuery {
    /// Comma-separated room names, e.g. `order:<id>,restaurant:<id>`.
    #[serde(default)]
    pub rooms: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(role: &str, vehicle: Option<Vehicle>) -> RegisterRequest {
        RegisterRequest {
            email: "a@b.test".into(),
            password: "long-enough".into(),
            full_name: "A".into(),
            phone: None,
            role: role.into(),
            default_address: None,
            company_name: None,
            vehicle,
        }
    }

    #[test]
    fn courier_registration_needs_a_vehicle() {
        assert!(matches!(register("livreur", None).profile(), Err(ApiError::Validation(_))));
        let profile = register("courier", Some(Vehicle::Scooter)).profile().unwrap();
        assert_eq!(profile.role(), Role::Livreur);
    }

    #[test]
    fn admin_cannot_self_register() {
        assert!(matches!(register("admin", None).profile(), Err(ApiError::Validation(_))));
        assert!(register("pilot", None).profile().is_err());
    }
}
