//! Process configuration, read from the environment (and `.env` when present).

use std::net::SocketAddr;
use std::str::FromStr;

use chrono::Duration;
use thiserror::Error;
use tracing::warn;

use miam_core::{BasisPoints, Money};
use miam_delivery::EarningsPolicy;
use miam_infra::DEFAULT_REALTIME_CAPACITY;

const DEV_JWT_SECRET: &str = "miam-dev-secret";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid { key: &'static str, value: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub jwt_ttl: Duration,
    pub database_url: Option<String>,
    pub realtime_capacity: usize,
    pub earnings: EarningsPolicy,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            jwt_ttl: Duration::hours(24),
            database_url: None,
            realtime_capacity: DEFAULT_REALTIME_CAPACITY,
            earnings: EarningsPolicy::default(),
            bootstrap_admin: None,
        }
    }
}

impl AppConfig {
    /// Defaults with a fixed secret, for tests and local runs.
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self { jwt_secret: jwt_secret.to_string(), ..Self::default() }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is the normal case outside development.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None => {
                warn!("JWT_SECRET not set; using insecure dev default");
                defaults.jwt_secret
            }
        };

        let ttl_minutes: i64 = parse_or(get("JWT_TTL_MINUTES"), "JWT_TTL_MINUTES", 24 * 60)?;
        if ttl_minutes <= 0 {
            return Err(invalid("JWT_TTL_MINUTES", ttl_minutes, "must be positive"));
        }

        let base = defaults.earnings;
        let earnings = EarningsPolicy {
            base_fee: cents(
                get("DELIVERY_BASE_FEE_CENTS"),
                "DELIVERY_BASE_FEE_CENTS",
                base.base_fee,
            )?,
            per_km: cents(get("DELIVERY_PER_KM_CENTS"), "DELIVERY_PER_KM_CENTS", base.per_km)?,
            courier_share: bps(get("COURIER_SHARE_BPS"), "COURIER_SHARE_BPS", base.courier_share)?,
            platform_commission: bps(
                get("PLATFORM_COMMISSION_BPS"),
                "PLATFORM_COMMISSION_BPS",
                base.platform_commission,
            )?,
            delivery_radius_m: parse_or(
                get("DELIVERY_RADIUS_M"),
                "DELIVERY_RADIUS_M",
                base.delivery_radius_m,
            )?,
            min_payout: cents(get("MIN_PAYOUT_CENTS"), "MIN_PAYOUT_CENTS", base.min_payout)?,
        }
        .validate()
        .map_err(|e| invalid("earnings policy", "", e))?;

        let admin = (get("BOOTSTRAP_ADMIN_EMAIL"), get("BOOTSTRAP_ADMIN_PASSWORD"));
        let bootstrap_admin = match admin {
            (Some(email), Some(password)) => Some(BootstrapAdmin { email, password }),
            (None, None) => None,
            _ => {
                return Err(invalid(
                    "BOOTSTRAP_ADMIN_EMAIL",
                    "",
                    "email and password must be set together",
                ));
            }
        };

        Ok(Self {
            bind_addr: parse_or(get("BIND_ADDR"), "BIND_ADDR", defaults.bind_addr)?,
            jwt_secret,
            jwt_ttl: Duration::minutes(ttl_minutes),
            database_url: get("DATABASE_URL"),
            realtime_capacity: parse_or(
                get("REALTIME_CAPACITY"),
                "REALTIME_CAPACITY",
                defaults.realtime_capacity,
            )?,
            earnings,
            bootstrap_admin,
        })
    }
}

fn invalid(key: &'static str, value: impl ToString, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid { key, value: value.to_string(), reason: reason.to_string() }
}

fn parse_or<T>(raw: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    match raw {
        None => Ok(default),
        Some(v) => v.parse().map_err(|e: T::Err| invalid(key, &v, e)),
    }
}

fn cents(raw: Option<String>, key: &'static str, default: Money) -> Result<Money, ConfigError> {
    parse_or(raw, key, default.cents()).map(Money::from_cents)
}

fn bps(
    raw: Option<String>,
    key: &'static str,
    default: BasisPoints,
) -> Result<BasisPoints, ConfigError> {
    parse_or(raw, key, default.get()).map(BasisPoints::new)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr.port(), 8080);
        assert_eq!(cfg.jwt_ttl, Duration::minutes(1440));
        assert_eq!(cfg.earnings, EarningsPolicy::default());
        assert_eq!(cfg.database_url, None);
        assert_eq!(cfg.bootstrap_admin, None);
    }

    #[test]
    fn earnings_overrides_are_applied() {
        let cfg = config(&[
            ("DELIVERY_BASE_FEE_CENTS", "300"),
            ("COURIER_SHARE_BPS", "7500"),
            ("MIN_PAYOUT_CENTS", "500"),
        ])
        .unwrap();
        assert_eq!(cfg.earnings.base_fee, Money::from_cents(300));
        assert_eq!(cfg.earnings.courier_share, BasisPoints::new(7_500));
        assert_eq!(cfg.earnings.min_payout, Money::from_cents(500));
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(config(&[("JWT_TTL_MINUTES", "soon")]).is_err());
        assert!(config(&[("JWT_TTL_MINUTES", "0")]).is_err());
        assert!(config(&[("COURIER_SHARE_BPS", "12000")]).is_err());
        assert!(config(&[("BIND_ADDR", "localhost")]).is_err());
    }

    #[test]
    fn bootstrap_admin_needs_both_halves() {
        assert!(config(&[("BOOTSTRAP_ADMIN_EMAIL", "root@miam.test")]).is_err());
        let cfg = config(&[
            ("BOOTSTRAP_ADMIN_EMAIL", "root@miam.test"),
            ("BOOTSTRAP_ADMIN_PASSWORD", "change-me-now"),
        ])
        .unwrap();
        assert_eq!(cfg.bootstrap_admin.unwrap().email, "root@miam.test");
    }
}
