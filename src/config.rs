//! Service configuration loaded from environment variables.
//!
//! ## Required
//! - `CAMPAIGN_API_URL` - base URL of the campaign lookup service
//!
//! ## Optional
//! - `PORT` - listen port (default: 8083)
//! - `CAMPAIGN_TIMEOUT_SECS` - coupon lookup timeout (default: 5)
//! - `CHECKOUT_STATE_DIR` - where per-session attempt state is kept (default: ./checkout-state)
//! - `COUPON_MAX_ATTEMPTS` - failed attempts before lockout (default: 5)
//! - `COUPON_LOCKOUT_MINUTES` - lockout length, at most one week (default: 10)
//! - `COUPON_COUNT_TRANSPORT_FAILURES` - whether lookup outages consume attempts (default: true)
//! - `CHECKOUT_TAX_RATE` - tax rate as a decimal in `[0, 1]` (default: 0.18)
//! - `CHECKOUT_CURRENCY` - display currency (default: INR)
//! - `PAYMENT_ROUTE` - payment step route (default: /payment)
//! - `SESSION_IDLE_MINUTES` - drop an untouched session from memory after this long (default: 30)
//! - `MAX_SESSIONS` - sessions held in memory at once (default: 10000)
//! - `NATS_URL` - publish checkout events to NATS when set

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::api::SessionPolicy;
use crate::coupon::guard::{DEFAULT_LOCKOUT_MINUTES, DEFAULT_MAX_ATTEMPTS};
use crate::coupon::{GuardPolicy, ValidatorOptions};
use crate::domain::aggregates::CheckoutOptions;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub campaign_api_url: String,
    pub state_dir: PathBuf,
    pub nats_url: Option<String>,
    pub guard: GuardPolicy,
    pub validator: ValidatorOptions,
    pub checkout: CheckoutOptions,
    pub sessions: SessionPolicy,
}

const MAX_LOCKOUT_MINUTES: i64 = 7 * 24 * 60;

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> { Self::from_lookup(|key| std::env::var(key).ok()) }

    /// Builds settings from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let campaign_api_url = var("CAMPAIGN_API_URL").ok_or_else(|| ConfigError::MissingEnvVar("CAMPAIGN_API_URL".into()))?;
        if !campaign_api_url.starts_with("http://") && !campaign_api_url.starts_with("https://") {
            return Err(ConfigError::InvalidEnvVar("CAMPAIGN_API_URL".into(), "must be an http(s) URL".into()));
        }

        let max_attempts: u32 = parse_or(&var, "COUPON_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidEnvVar("COUPON_MAX_ATTEMPTS".into(), "must be at least 1".into()));
        }
        let lockout_minutes: i64 = parse_or(&var, "COUPON_LOCKOUT_MINUTES", DEFAULT_LOCKOUT_MINUTES)?;
        let lockout = chrono::Duration::try_minutes(lockout_minutes)
            .filter(|_| (1..=MAX_LOCKOUT_MINUTES).contains(&lockout_minutes))
            .ok_or_else(|| ConfigError::InvalidEnvVar("COUPON_LOCKOUT_MINUTES".into(), format!("must be between 1 and {}", MAX_LOCKOUT_MINUTES)))?;
        let tax_rate: Decimal = parse_or(&var, "CHECKOUT_TAX_RATE", Decimal::new(18, 2))?;
        if tax_rate < Decimal::ZERO || tax_rate > Decimal::ONE {
            return Err(ConfigError::InvalidEnvVar("CHECKOUT_TAX_RATE".into(), "must be between 0 and 1".into()));
        }
        let idle_minutes: u64 = parse_or(&var, "SESSION_IDLE_MINUTES", 30)?;
        let max_sessions: usize = parse_or(&var, "MAX_SESSIONS", 10_000)?;
        if idle_minutes == 0 || idle_minutes > MAX_LOCKOUT_MINUTES as u64 || max_sessions == 0 {
            return Err(ConfigError::InvalidEnvVar("SESSION_IDLE_MINUTES/MAX_SESSIONS".into(), "must be positive and bounded".into()));
        }

        Ok(Self {
            port: parse_or(&var, "PORT", 8083)?,
            campaign_api_url,
            state_dir: var("CHECKOUT_STATE_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("./checkout-state")),
            nats_url: var("NATS_URL"),
            guard: GuardPolicy { max_attempts, lockout },
            validator: ValidatorOptions {
                lookup_timeout: Duration::from_secs(parse_or(&var, "CAMPAIGN_TIMEOUT_SECS", 5)?),
                count_transport_failures: parse_or(&var, "COUPON_COUNT_TRANSPORT_FAILURES", true)?,
            },
            checkout: CheckoutOptions {
                tax_rate,
                currency: var("CHECKOUT_CURRENCY").unwrap_or_else(|| "INR".into()).to_ascii_uppercase(),
                payment_route: var("PAYMENT_ROUTE").unwrap_or_else(|| "/payment".into()),
            },
            sessions: SessionPolicy { idle_timeout: Duration::from_secs(idle_minutes * 60), max_sessions },
        })
    }
}

fn parse_or<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}
