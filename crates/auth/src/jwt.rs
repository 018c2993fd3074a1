//! HS256 bearer tokens.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;

use miam_core::UserId;

use crate::{JwtClaims, Role, TokenValidationError, validate_claims};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed or forged token: {0}")]
    Invalid(String),

    #[error(transparent)]
    Claims(#[from] TokenValidationError),

    #[error("token encoding failed: {0}")]
    Encode(String),
}

/// Verifies a bearer token and returns its claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenError>;
}

/// Mints bearer tokens for authenticated accounts.
pub trait TokenIssuer: Send + Sync {
    fn issue(
        &self,
        user_id: UserId,
        email: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<(String, JwtClaims), TokenError>;
}

/// Shared-secret signer and validator.
#[derive(Clone)]
pub struct Hs256Jwt {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl core::fmt::Debug for Hs256Jwt {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256Jwt")
            .field("secret", &"<redacted>")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl Hs256Jwt {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn validation() -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against the caller's clock in `validate_claims`.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        validation
    }
}

impl TokenIssuer for Hs256Jwt {
    fn issue(
        &self,
        user_id: UserId,
        email: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<(String, JwtClaims), TokenError> {
        let claims = JwtClaims {
            sub: user_id,
            email: email.to_string(),
            role,
            iat: now,
            exp: now + self.ttl,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Encode(e.to_string()))?;
        Ok((token, claims))
    }
}

impl JwtValidator for Hs256Jwt {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenError> {
        let data = decode::<JwtClaims>(token, &self.decoding, &Self::validation())
            .map_err(|e| TokenError::Invalid(e.to_string()))?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt() -> Hs256Jwt {
        Hs256Jwt::new(b"unit-test-secret", Duration::hours(24))
    }

    #[test]
    fn issued_tokens_validate() {
        let now = Utc::now();
        let user = UserId::new();
        let (token, issued) = jwt().issue(user, "kofi@example.com", Role::Livreur, now).unwrap();

        let claims = jwt().validate(&token, now + Duration::minutes(1)).unwrap();
        assert_eq!(claims.sub, user);
        assert_eq!(claims.role, Role::Livreur);
        assert_eq!(claims.exp.timestamp(), issued.exp.timestamp());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let now = Utc::now();
        let (token, _) = jwt().issue(UserId::new(), "a@b.c", Role::Client, now).unwrap();

        let err = jwt().validate(&token, now + Duration::hours(25)).unwrap_err();
        assert_eq!(err, TokenError::Claims(TokenValidationError::Expired));
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        let now = Utc::now();
        let other = Hs256Jwt::new(b"someone-else", Duration::hours(1));
        let (token, _) = other.issue(UserId::new(), "a@b.c", Role::Admin, now).unwrap();

        assert!(matches!(jwt().validate(&token, now), Err(TokenError::Invalid(_))));
        assert!(matches!(jwt().validate("garbage", now), Err(TokenError::Invalid(_))));
    }
}
