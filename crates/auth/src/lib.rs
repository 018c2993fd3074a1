//! `miam-auth`: identity and access for the marketplace.
//!
//! - [`account`]: the event-sourced account aggregate (registration, profile,
//!   courier availability, suspension)
//! - [`password`] / [`jwt`]: credential hashing and bearer tokens
//! - [`roles`], [`permissions`], [`authorize`]: role-based access checks
//!
//! HTTP extraction of the bearer token lives in the API crate.

pub mod account;
pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod password;
pub mod permissions;
pub mod roles;

pub use account::{
    ACCOUNT_AGGREGATE, Account, AccountCommand, AccountEvent, AccountStatus, ActivateAccount,
    ChangePassword, RegisterAccount, RegistrationChannel, RoleProfile, SetCourierAvailability,
    SuspendAccount, UpdateProfile, Vehicle, normalize_email,
};
pub use authorize::{AuthzError, CommandAuthorization, Principal, authorize, ensure_owner_or_admin};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256Jwt, JwtValidator, TokenError, TokenIssuer};
pub use password::{PasswordError, hash_password, verify_password};
pub use permissions::{Permission, permissions_for};
pub use roles::Role;
