//! Coupon validation.
//!
//! Checks a code against the campaign service, applies the business rules
//! (active flag, date window) and routes every result through the
//! [`AttemptGuard`] so that guessing codes gets locked out.

pub mod guard;
pub mod http;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::domain::value_objects::{CouponCode, CouponCodeError, DiscountFraction};
use crate::error::{LookupError, StoreError};

pub use guard::{AttemptGuard, CouponAttemptState, GuardPolicy, GuardState, GuardStatus};
pub use http::HttpCampaignClient;

/// Campaign record as returned by the lookup service. Read-only here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub code: String,
    pub discount_percent: Decimal,
    pub active: bool,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

/// Campaign lookup. An empty list means "no such code"; `Err` is reserved for
/// transport trouble.
#[async_trait]
pub trait CouponLookup: Send + Sync {
    async fn search(&self, code: &CouponCode) -> Result<Vec<Coupon>, LookupError>;
}

/// In-process campaign list. Counts calls so callers can assert on them.
#[derive(Debug, Default)]
pub struct StaticCampaigns {
    coupons: Vec<Coupon>,
    unreachable: bool,
    delay: Option<Duration>,
    calls: AtomicU64,
}

impl StaticCampaigns {
    pub fn new(coupons: Vec<Coupon>) -> Self { Self { coupons, ..Self::default() } }

    /// Every search fails with a transport error.
    pub fn unreachable() -> Self { Self { unreachable: true, ..Self::default() } }

    pub fn with_delay(mut self, delay: Duration) -> Self { self.delay = Some(delay); self }

    pub fn calls(&self) -> u64 { self.calls.load(Ordering::Relaxed) }
}

#[async_trait]
impl CouponLookup for StaticCampaigns {
    async fn search(&self, code: &CouponCode) -> Result<Vec<Coupon>, LookupError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable {
            return Err(LookupError::Transport("connection refused".into()));
        }
        Ok(self.coupons.iter().filter(|c| c.code.eq_ignore_ascii_case(code.as_str())).cloned().collect())
    }
}

/// Why a code was turned down. Each cause has its own message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CouponRejection {
    EmptyCode,
    Blocked { until: DateTime<Utc>, retry_after_secs: i64 },
    NotFound,
    Inactive,
    Expired,
    LookupFailed,
}

impl CouponRejection {
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyCode => "Please enter a coupon code".to_string(),
            Self::Blocked { retry_after_secs, .. } => {
                let minutes = (retry_after_secs + 59) / 60;
                format!("Too many invalid attempts. Coupon entry is temporarily blocked, try again in {} minute(s)", minutes.max(1))
            }
            Self::NotFound => "Invalid coupon code".to_string(),
            Self::Inactive => "Coupon no longer active".to_string(),
            Self::Expired => "Coupon expired".to_string(),
            Self::LookupFailed => "Failed to validate coupon, please try again".to_string(),
        }
    }
}

impl std::fmt::Display for CouponRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(&self.user_message()) }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedCoupon {
    pub code: CouponCode,
    pub discount: DiscountFraction,
    pub applied_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CouponOutcome {
    Applied { coupon: AppliedCoupon, guard: GuardStatus },
    Rejected { reason: CouponRejection, guard: GuardStatus },
}

impl CouponOutcome {
    pub fn is_applied(&self) -> bool { matches!(self, Self::Applied { .. }) }

    pub fn guard(&self) -> &GuardStatus {
        match self {
            Self::Applied { guard, .. } | Self::Rejected { guard, .. } => guard,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidatorOptions {
    pub lookup_timeout: Duration,
    /// Whether transport failures consume an attempt. They do by default.
    pub count_transport_failures: bool,
}

impl Default for ValidatorOptions {
    fn default() -> Self { Self { lookup_timeout: Duration::from_secs(5), count_transport_failures: true } }
}

pub struct CouponValidator {
    lookup: Arc<dyn CouponLookup>,
    guard: AttemptGuard,
    clock: Arc<dyn Clock>,
    options: ValidatorOptions,
}

impl CouponValidator {
    pub fn new(lookup: Arc<dyn CouponLookup>, guard: AttemptGuard, clock: Arc<dyn Clock>, options: ValidatorOptions) -> Self {
        Self { lookup, guard, clock, options }
    }

    pub fn guard(&self) -> &AttemptGuard { &self.guard }

    /// Validates a raw code as typed by the shopper.
    ///
    /// Store failures are the only `Err`. Every logical outcome, including a
    /// lookup that could not reach the campaign service, is a [`CouponOutcome`].
    #[tracing::instrument(skip(self, raw_code), fields(code = %raw_code.trim()))]
    pub async fn validate(&self, raw_code: &str) -> Result<CouponOutcome, StoreError> {
        let status = self.guard.status()?;
        if status.is_blocked() {
            let now = self.clock.now();
            let until = status.block_end.unwrap_or(now);
            let retry_after_secs = status.retry_after(now).map(|d| d.num_seconds()).unwrap_or(0);
            tracing::info!(%until, "coupon attempt refused while locked");
            return Ok(CouponOutcome::Rejected { reason: CouponRejection::Blocked { until, retry_after_secs }, guard: status });
        }

        let code = match CouponCode::parse(raw_code) {
            Ok(code) => code,
            Err(CouponCodeError::Empty) => return Ok(CouponOutcome::Rejected { reason: CouponRejection::EmptyCode, guard: status }),
            Err(CouponCodeError::TooLong) => {
                let guard = self.guard.record_failure()?;
                return Ok(CouponOutcome::Rejected { reason: CouponRejection::NotFound, guard });
            }
        };

        let found = match tokio::time::timeout(self.options.lookup_timeout, self.lookup.search(&code)).await {
            Ok(Ok(coupons)) => coupons.into_iter().next(),
            Ok(Err(e)) => return self.transport_failure(e),
            Err(_) => return self.transport_failure(LookupError::Timeout),
        };

        match found.ok_or(CouponRejection::NotFound).and_then(|c| self.judge(&c)) {
            Ok(discount) => {
                let guard = self.guard.record_success()?;
                tracing::info!(code = %code, percent = %discount.percent(), "coupon applied");
                let coupon = AppliedCoupon { code, discount, applied_at: self.clock.now() };
                Ok(CouponOutcome::Applied { coupon, guard })
            }
            Err(reason) => {
                let guard = self.guard.record_failure()?;
                tracing::info!(code = %code, %reason, remaining = guard.remaining_attempts, "coupon rejected");
                Ok(CouponOutcome::Rejected { reason, guard })
            }
        }
    }

    fn judge(&self, coupon: &Coupon) -> Result<DiscountFraction, CouponRejection> {
        if !coupon.active {
            return Err(CouponRejection::Inactive);
        }
        let now = self.clock.now();
        if now < coupon.start_date || now > coupon.end_date {
            return Err(CouponRejection::Expired);
        }
        DiscountFraction::from_percent(coupon.discount_percent).map_err(|e| {
            tracing::warn!(code = %coupon.code, error = %e, "campaign carries an unusable discount");
            CouponRejection::NotFound
        })
    }

    fn transport_failure(&self, error: LookupError) -> Result<CouponOutcome, StoreError> {
        tracing::warn!(%error, "coupon lookup failed");
        let guard = if self.options.count_transport_failures { self.guard.record_failure()? } else { self.guard.status()? };
        Ok(CouponOutcome::Rejected { reason: CouponRejection::LookupFailed, guard })
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};

    pub fn now() -> DateTime<Utc> { Utc.with_ymd_and_hms(2026, 5, 10, 9, 30, 0).unwrap() }

    pub fn coupon(code: &str, percent: i64) -> Coupon {
        Coupon {
            code: code.to_string(),
            discount_percent: Decimal::from(percent),
            active: true,
            start_date: now() - ChronoDuration::days(7),
            end_date: now() + ChronoDuration::days(7),
        }
    }

    pub fn catalogue() -> Vec<Coupon> {
        let mut paused = coupon("PAUSED", 10);
        paused.active = false;
        let mut old = coupon("DIWALI", 30);
        old.start_date = now() - ChronoDuration::days(60);
        old.end_date = now() - ChronoDuration::days(30);
        let mut soon = coupon("NEWYEAR", 25);
        soon.start_date = now() + ChronoDuration::days(30);
        soon.end_date = now() + ChronoDuration::days(40);
        vec![coupon("SKIN20", 20), coupon("HALF", 50), paused, old, soon, coupon("FREE", 100)]
    }
}
