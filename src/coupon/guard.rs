//! Coupon attempt guard.
//!
//! Counts failed coupon validations for one browser session and locks coupon
//! entry for a while once the budget is spent. State lives in a [`StateStore`]
//! so a page reload does not reset the budget. Lockout expiry is evaluated
//! lazily, on the next call, never by a timer.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::StoreError;
use crate::store::StateStore;

pub const ATTEMPTS_KEY: &str = "checkout.coupon.attempts";
pub const BLOCK_END_KEY: &str = "checkout.coupon.block_end";

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_LOCKOUT_MINUTES: i64 = 10;

/// 9999-12-31T23:59:59Z, the last instant RFC 3339 can store.
const LATEST_BLOCK_END_SECS: i64 = 253_402_300_799;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GuardPolicy {
    pub max_attempts: u32,
    pub lockout: Duration,
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_MAX_ATTEMPTS, lockout: Duration::minutes(DEFAULT_LOCKOUT_MINUTES) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardState {
    Open,
    /// One attempt left. Behaves like `Open`; the page shows a warning.
    Warned,
    Blocked,
}

/// Persisted attempt state. Blocked iff `block_end` is set and in the future.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CouponAttemptState {
    pub attempt_count: u32,
    pub block_end: Option<DateTime<Utc>>,
}

impl CouponAttemptState {
    pub fn is_blocked(&self, now: DateTime<Utc>) -> bool {
        self.block_end.is_some_and(|end| now < end)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardStatus {
    pub state: GuardState,
    pub attempt_count: u32,
    pub remaining_attempts: u32,
    pub block_end: Option<DateTime<Utc>>,
}

impl GuardStatus {
    pub fn is_blocked(&self) -> bool { self.state == GuardState::Blocked }

    /// Time left on the lockout, if any.
    pub fn retry_after(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.block_end.map(|end| end - now).filter(|d| *d > Duration::zero())
    }
}

pub struct AttemptGuard {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    policy: GuardPolicy,
}

impl AttemptGuard {
    pub fn new(store: Arc<dyn StateStore>, clock: Arc<dyn Clock>, policy: GuardPolicy) -> Self {
        Self { store, clock, policy }
    }

    pub fn policy(&self) -> GuardPolicy { self.policy }

    /// Current status, resetting an expired lockout first.
    pub fn status(&self) -> Result<GuardStatus, StoreError> {
        let now = self.clock.now();
        let state = self.refresh(now)?;
        Ok(self.describe(&state, now))
    }

    /// Counts one failed attempt. Starts the lockout once the budget is spent.
    /// A guard that is already blocked is left untouched.
    pub fn record_failure(&self) -> Result<GuardStatus, StoreError> {
        let now = self.clock.now();
        let mut state = self.refresh(now)?;
        if state.is_blocked(now) {
            return Ok(self.describe(&state, now));
        }
        state.attempt_count = state.attempt_count.saturating_add(1);
        if state.attempt_count >= self.policy.max_attempts {
            let end = self.lockout_end(now);
            state.block_end = Some(end);
            tracing::warn!(attempts = state.attempt_count, until = %end, "coupon entry locked");
        }
        self.save(&state)?;
        Ok(self.describe(&state, now))
    }

    /// A coupon was accepted: the budget starts over.
    pub fn record_success(&self) -> Result<GuardStatus, StoreError> {
        let now = self.clock.now();
        let state = self.refresh(now)?;
        if state.is_blocked(now) {
            return Ok(self.describe(&state, now));
        }
        self.reset()?;
        Ok(self.describe(&CouponAttemptState::default(), now))
    }

    pub fn remaining_attempts(&self) -> Result<u32, StoreError> {
        Ok(self.status()?.remaining_attempts)
    }

    fn lockout_end(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let latest = DateTime::from_timestamp(LATEST_BLOCK_END_SECS, 0).unwrap_or(DateTime::<Utc>::MAX_UTC);
        now.checked_add_signed(self.policy.lockout).map_or(latest, |end| end.min(latest))
    }

    fn refresh(&self, now: DateTime<Utc>) -> Result<CouponAttemptState, StoreError> {
        let state = self.load()?;
        match state.block_end {
            Some(end) if now >= end => {
                tracing::info!(expired_at = %end, "coupon lockout expired");
                self.reset()?;
                Ok(CouponAttemptState::default())
            }
            _ => Ok(state),
        }
    }

    fn describe(&self, state: &CouponAttemptState, now: DateTime<Utc>) -> GuardStatus {
        let max = self.policy.max_attempts;
        let guard_state = if state.is_blocked(now) {
            GuardState::Blocked
        } else if state.attempt_count.saturating_add(1) >= max {
            GuardState::Warned
        } else {
            GuardState::Open
        };
        GuardStatus {
            state: guard_state,
            attempt_count: state.attempt_count,
            remaining_attempts: max.saturating_sub(state.attempt_count),
            block_end: state.block_end.filter(|_| guard_state == GuardState::Blocked),
        }
    }

    fn load(&self) -> Result<CouponAttemptState, StoreError> {
        let attempt_count = match self.store.get(ATTEMPTS_KEY)? {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "ignoring unreadable coupon attempt count");
                0
            }),
            None => 0,
        };
        let block_end = match self.store.get(BLOCK_END_KEY)? {
            Some(raw) => match DateTime::parse_from_rfc3339(&raw) {
                Ok(ts) => Some(ts.with_timezone(&Utc)),
                Err(e) => {
                    tracing::warn!(value = %raw, error = %e, "ignoring unreadable coupon lockout end");
                    None
                }
            },
            None => None,
        };
        Ok(CouponAttemptState { attempt_count, block_end })
    }

    fn save(&self, state: &CouponAttemptState) -> Result<(), StoreError> {
        self.store.set(ATTEMPTS_KEY, &state.attempt_count.to_string())?;
        match state.block_end {
            Some(end) => self.store.set(BLOCK_END_KEY, &end.to_rfc3339()),
            None => self.store.clear(BLOCK_END_KEY),
        }
    }

    fn reset(&self) -> Result<(), StoreError> {
        self.store.clear(ATTEMPTS_KEY)?;
        self.store.clear(BLOCK_END_KEY)
    }
}
