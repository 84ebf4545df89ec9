//! Domain events raised by a checkout session
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::coupon::CouponRejection;
use crate::domain::value_objects::CouponCode;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CheckoutEvent {
    AddressSubmitted { checkout_id: String },
    CouponApplied { checkout_id: String, code: CouponCode, percent: Decimal },
    CouponRejected { checkout_id: String, reason: CouponRejection, remaining_attempts: u32 },
    CouponLockout { checkout_id: String, until: DateTime<Utc> },
    CouponRemoved { checkout_id: String, code: CouponCode },
    PaymentRequested { checkout_id: String, total: Decimal },
}

impl CheckoutEvent {
    pub fn subject(&self) -> &'static str { "checkout.events" }
}
