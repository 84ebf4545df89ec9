//! Price calculation for the checkout page.
//!
//! Everything is computed at full decimal precision. Rounding to two places
//! happens only when a snapshot is turned into a [`PriceBreakdown`].

use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::aggregates::cart::CartLineItem;
use crate::domain::value_objects::{DiscountFraction, Money};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingSnapshot {
    pub subtotal: Decimal,
    pub discount_fraction: Decimal,
    pub discounted_subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl PricingSnapshot {
    /// Pure: same inputs always give the same snapshot.
    pub fn compute(items: &[CartLineItem], discount: DiscountFraction, tax_rate: Decimal) -> Self {
        let subtotal: Decimal = items.iter().map(CartLineItem::line_total).sum();
        let discounted_subtotal = subtotal * (Decimal::ONE - discount.value());
        let tax = discounted_subtotal * tax_rate;
        Self {
            subtotal,
            discount_fraction: discount.value(),
            discounted_subtotal,
            tax,
            total: discounted_subtotal + tax,
        }
    }

    pub fn discount_amount(&self) -> Decimal { self.subtotal - self.discounted_subtotal }

    pub fn breakdown(&self, currency: &str) -> PriceBreakdown {
        PriceBreakdown {
            subtotal: Money::new(self.subtotal, currency).to_string(),
            discount: Money::new(self.discount_amount(), currency).to_string(),
            discount_percent: (self.discount_fraction * Decimal::ONE_HUNDRED).normalize(),
            tax: Money::new(self.tax, currency).to_string(),
            total: Money::new(self.total, currency).to_string(),
        }
    }
}

/// Display form of a snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    pub subtotal: String,
    pub discount: String,
    pub discount_percent: Decimal,
    pub tax: String,
    pub total: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::cart::line;

    fn gst() -> Decimal { Decimal::new(18, 2) }

    #[test]
    fn test_twenty_percent_off_thousand() {
        let items = vec![line("A", 400, 2), line("B", 200, 1)];
        let discount = DiscountFraction::from_percent(Decimal::new(20, 0)).unwrap();
        let p = PricingSnapshot::compute(&items, discount, gst());
        assert_eq!(p.subtotal, Decimal::new(1000, 0));
        assert_eq!(p.discounted_subtotal, Decimal::new(800, 0));
        assert_eq!(p.tax, Decimal::new(144, 0));
        assert_eq!(p.total, Decimal::new(944, 0));
        assert_eq!(p.discount_amount(), Decimal::new(200, 0));
    }

    #[test]
    fn test_total_is_discounted_plus_tax() {
        let items = vec![line("A", 333, 3), line("B", 17, 7)];
        for pct in [0, 5, 33, 99] {
            let d = DiscountFraction::from_percent(Decimal::from(pct)).unwrap();
            for rate in [Decimal::ZERO, gst(), Decimal::new(7, 3)] {
                let p = PricingSnapshot::compute(&items, d, rate);
                assert_eq!(p.total, p.discounted_subtotal + p.tax);
                assert!(p.discounted_subtotal <= p.subtotal);
                assert!(p.tax >= Decimal::ZERO && p.total >= Decimal::ZERO);
            }
        }
    }

    #[test]
    fn test_empty_cart_is_all_zero() {
        let p = PricingSnapshot::compute(&[], DiscountFraction::NONE, gst());
        assert_eq!(p.total, Decimal::ZERO);
    }

    #[test]
    fn test_breakdown_rounds_for_display_only() {
        let items = vec![line("A", 999, 1)];
        let d = DiscountFraction::from_percent(Decimal::new(15, 0)).unwrap();
        let p = PricingSnapshot::compute(&items, d, gst());
        // 999 * 0.85 = 849.15, tax 152.847
        assert_eq!(p.tax, Decimal::new(152847, 3));
        let b = p.breakdown("INR");
        assert_eq!(b.tax, "INR 152.85");
        assert_eq!(b.total, "INR 1002.00");
        assert_eq!(b.discount_percent, Decimal::new(15, 0));
    }
}
