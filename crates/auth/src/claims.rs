use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use miam_core::UserId;

use crate::Role;

/// Claims carried by a Miam bearer token.
///
/// `iat`/`exp` are Unix seconds on the wire, as registered JWT claims are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: UserId,
    pub email: String,
    pub role: Role,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub iat: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub exp: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,
}

/// Time-window check on already-decoded claims. Signatures are checked in [`crate::jwt`].
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn claims(iat: DateTime<Utc>, exp: DateTime<Utc>) -> JwtClaims {
        JwtClaims {
            sub: UserId::new(),
            email: "ana@example.com".into(),
            role: Role::Client,
            iat,
            exp,
        }
    }

    #[test]
    fn window_boundaries() {
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let c = claims(t0, t0 + Duration::hours(1));

        assert_eq!(validate_claims(&c, t0), Ok(()));
        assert_eq!(
            validate_claims(&c, t0 - Duration::seconds(1)),
            Err(TokenValidationError::NotYetValid)
        );
        assert_eq!(
            validate_claims(&c, t0 + Duration::hours(1)),
            Err(TokenValidationError::Expired)
        );
        assert_eq!(
            validate_claims(&claims(t0, t0), t0),
            Err(TokenValidationError::InvalidTimeWindow)
        );
    }

    #[test]
    fn timestamps_are_unix_seconds_on_the_wire() {
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let json = serde_json::to_value(claims(t0, t0 + Duration::minutes(5))).unwrap();
        assert_eq!(json["iat"], t0.timestamp());
        assert_eq!(json["role"], "client");
    }
}
