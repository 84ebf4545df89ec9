//! Value Objects for checkout

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Coupon code value object. Normalized to trimmed uppercase on construction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CouponCode(String);

impl CouponCode {
    pub fn parse(value: impl AsRef<str>) -> Result<Self, CouponCodeError> {
        let value = value.as_ref().trim().to_uppercase();
        if value.is_empty() { return Err(CouponCodeError::Empty); }
        if value.len() > 64 { return Err(CouponCodeError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for CouponCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponCodeError {
    #[error("please enter a coupon code")]
    Empty,
    #[error("coupon code is too long")]
    TooLong,
}

/// Money value object. Amounts keep full precision; rounding happens in `Display`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: Decimal, currency: String }

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self { Self { amount, currency: currency.to_string() } }
    pub fn inr(amount: Decimal) -> Self { Self::new(amount, "INR") }
    pub fn zero(currency: &str) -> Self { Self::new(Decimal::ZERO, currency) }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }
    /// Amount rounded half-away-from-zero to two places, for display only.
    pub fn rounded(&self) -> Decimal {
        self.amount.round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
    }
}

impl Default for Money { fn default() -> Self { Self::zero("INR") } }

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{} {:.2}", self.currency, self.rounded()) }
}

/// Line quantity. Always at least one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Result<Self, QuantityError> {
        if value == 0 { return Err(QuantityError::Zero); }
        Ok(Self(value))
    }
    pub fn one() -> Self { Self(1) }
    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: Quantity) -> Self { Self(self.0.saturating_add(other.0)) }
}

impl TryFrom<u32> for Quantity {
    type Error = QuantityError;
    fn try_from(value: u32) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> Self { q.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("quantity must be a positive integer")]
    Zero,
}

/// Price of one unit. Never negative, never above [`UnitPrice::MAX`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct UnitPrice(Decimal);

impl UnitPrice {
    /// One crore: far above any skin, far below where line arithmetic could overflow.
    pub const MAX: Decimal = Decimal::from_parts(10_000_000, 0, 0, false, 0);

    pub fn new(value: Decimal) -> Result<Self, UnitPriceError> {
        if value < Decimal::ZERO { return Err(UnitPriceError::Negative(value)); }
        if value > Self::MAX { return Err(UnitPriceError::TooLarge(value)); }
        Ok(Self(value))
    }
    pub fn value(&self) -> Decimal { self.0 }
}

impl TryFrom<Decimal> for UnitPrice {
    type Error = UnitPriceError;
    fn try_from(value: Decimal) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<UnitPrice> for Decimal {
    fn from(p: UnitPrice) -> Self { p.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitPriceError {
    #[error("unit price {0} must not be negative")]
    Negative(Decimal),
    #[error("unit price {0} is above the allowed maximum")]
    TooLarge(Decimal),
}

/// Discount as a multiplier in `[0, 1)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Serialize, Deserialize)]
pub struct DiscountFraction(Decimal);

impl DiscountFraction {
    pub const NONE: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Result<Self, DiscountError> {
        if value < Decimal::ZERO || value >= Decimal::ONE { return Err(DiscountError::OutOfRange(value)); }
        Ok(Self(value))
    }

    /// `20` becomes `0.20`.
    pub fn from_percent(percent: Decimal) -> Result<Self, DiscountError> {
        Self::new(percent / Decimal::ONE_HUNDRED)
    }

    pub fn value(&self) -> Decimal { self.0 }
    pub fn percent(&self) -> Decimal { (self.0 * Decimal::ONE_HUNDRED).normalize() }
    pub fn is_none(&self) -> bool { self.0.is_zero() }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscountError {
    #[error("discount fraction {0} is outside [0, 1)")]
    OutOfRange(Decimal),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coupon_code_normalizes() {
        let code = CouponCode::parse("  skin20 \n").unwrap();
        assert_eq!(code.as_str(), "SKIN20");
        assert_eq!(CouponCode::parse("   "), Err(CouponCodeError::Empty));
    }

    #[test]
    fn test_money_display_rounds_only_at_the_edge() {
        let m = Money::inr(Decimal::new(1234565, 4));
        assert_eq!(m.amount(), Decimal::new(1234565, 4));
        assert_eq!(m.to_string(), "INR 123.46");
    }

    #[test]
    fn test_quantity_rejects_zero() {
        assert_eq!(Quantity::new(0), Err(QuantityError::Zero));
        assert_eq!(Quantity::new(2).unwrap().add(Quantity::one()).value(), 3);
        assert!(serde_json::from_str::<Quantity>("0").is_err());
    }

    #[test]
    fn test_unit_price_bounds() {
        assert_eq!(UnitPrice::new(Decimal::new(-500, 0)), Err(UnitPriceError::Negative(Decimal::new(-500, 0))));
        assert!(matches!(UnitPrice::new(Decimal::MAX), Err(UnitPriceError::TooLarge(_))));
        assert_eq!(UnitPrice::new(Decimal::ZERO).unwrap().value(), Decimal::ZERO);
        assert_eq!(UnitPrice::new(UnitPrice::MAX).unwrap().value(), Decimal::new(10_000_000, 0));
        assert!(serde_json::from_str::<UnitPrice>("\"-0.01\"").is_err());
        assert_eq!(serde_json::from_str::<UnitPrice>("\"499.00\"").unwrap().value(), Decimal::new(49900, 2));
    }

    #[test]
    fn test_discount_fraction_range() {
        let d = DiscountFraction::from_percent(Decimal::new(20, 0)).unwrap();
        assert_eq!(d.value(), Decimal::new(20, 2));
        assert_eq!(d.percent(), Decimal::new(20, 0));
        assert!(DiscountFraction::from_percent(Decimal::ONE_HUNDRED).is_err());
        assert!(DiscountFraction::new(Decimal::new(-1, 2)).is_err());
        assert!(DiscountFraction::NONE.is_none());
    }
}
