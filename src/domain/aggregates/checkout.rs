//! Checkout Aggregate
//!
//! One checkout page: shipping address, coupon entry and the price breakdown,
//! gating the hand-off to payment on a confirmed address.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::coupon::{AppliedCoupon, CouponOutcome, CouponRejection, CouponValidator, GuardState};
use crate::domain::aggregates::address::{AddressForm, FieldErrors, FormMode, ShippingAddress};
use crate::domain::aggregates::cart::{CartLineItem, CartSource};
use crate::domain::events::CheckoutEvent;
use crate::domain::pricing::{PriceBreakdown, PricingSnapshot};
use crate::domain::value_objects::DiscountFraction;
use crate::error::{CheckoutError, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutOptions {
    pub tax_rate: Decimal,
    pub currency: String,
    pub payment_route: String,
}

impl Default for CheckoutOptions {
    fn default() -> Self {
        Self { tax_rate: Decimal::new(18, 2), currency: "INR".to_string(), payment_route: "/payment".to_string() }
    }
}

pub struct CheckoutSession {
    id: String,
    address: AddressForm,
    validator: CouponValidator,
    applied: Option<AppliedCoupon>,
    coupon_error: Option<String>,
    options: CheckoutOptions,
    events: Vec<CheckoutEvent>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressSection {
    pub mode: FormMode,
    pub address: ShippingAddress,
    pub errors: FieldErrors,
    pub submitted: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponSection {
    pub state: GuardState,
    pub remaining_attempts: u32,
    pub blocked_until: Option<DateTime<Utc>>,
    pub applied: Option<AppliedCoupon>,
    pub error: Option<String>,
    pub warning: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutView {
    pub checkout_id: String,
    pub items: Vec<CartLineItem>,
    pub address: AddressSection,
    pub coupon: CouponSection,
    pub pricing: PricingSnapshot,
    pub breakdown: PriceBreakdown,
    pub can_proceed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRedirect {
    pub checkout_id: String,
    pub route: String,
    pub total: Decimal,
}

impl CheckoutSession {
    pub fn new(validator: CouponValidator, options: CheckoutOptions) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            address: AddressForm::new(),
            validator,
            applied: None,
            coupon_error: None,
            options,
            events: vec![],
        }
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn address_form(&self) -> &AddressForm { &self.address }
    pub fn applied_coupon(&self) -> Option<&AppliedCoupon> { self.applied.as_ref() }
    pub fn coupon_error(&self) -> Option<&str> { self.coupon_error.as_deref() }

    /// Discount from the last accepted coupon, or none.
    pub fn discount(&self) -> DiscountFraction {
        self.applied.as_ref().map(|c| c.discount).unwrap_or(DiscountFraction::NONE)
    }

    pub fn update_address(&mut self, address: ShippingAddress) -> Result<()> { self.address.update(address) }

    pub fn submit_address(&mut self) -> std::result::Result<(), FieldErrors> {
        let already_reviewing = self.address.mode() == FormMode::Reviewing;
        self.address.submit()?;
        if !already_reviewing {
            self.raise_event(CheckoutEvent::AddressSubmitted { checkout_id: self.id.clone() });
        }
        Ok(())
    }

    pub fn edit_address(&mut self) { self.address.edit(); }

    /// Runs the shopper's code through the validator. A rejection never
    /// clears a coupon that is already applied.
    pub async fn apply_coupon(&mut self, raw_code: &str) -> Result<CouponOutcome> {
        let outcome = self.validator.validate(raw_code).await?;
        match &outcome {
            CouponOutcome::Applied { coupon, .. } => {
                self.coupon_error = None;
                self.raise_event(CheckoutEvent::CouponApplied {
                    checkout_id: self.id.clone(),
                    code: coupon.code.clone(),
                    percent: coupon.discount.percent(),
                });
                self.applied = Some(coupon.clone());
            }
            CouponOutcome::Rejected { reason, guard } => {
                self.coupon_error = Some(reason.user_message());
                self.raise_event(CheckoutEvent::CouponRejected {
                    checkout_id: self.id.clone(),
                    reason: reason.clone(),
                    remaining_attempts: guard.remaining_attempts,
                });
                // lockout started by this attempt, not one already in force
                let already_blocked = matches!(reason, CouponRejection::Blocked { .. });
                if let Some(until) = guard.block_end.filter(|_| !already_blocked) {
                    self.raise_event(CheckoutEvent::CouponLockout { checkout_id: self.id.clone(), until });
                }
            }
        }
        Ok(outcome)
    }

    pub fn remove_coupon(&mut self) -> Option<AppliedCoupon> {
        let removed = self.applied.take()?;
        self.coupon_error = None;
        self.raise_event(CheckoutEvent::CouponRemoved { checkout_id: self.id.clone(), code: removed.code.clone() });
        Some(removed)
    }

    pub fn pricing<C: CartSource + ?Sized>(&self, cart: &C) -> PricingSnapshot {
        PricingSnapshot::compute(cart.line_items(), self.discount(), self.options.tax_rate)
    }

    pub fn coupon_section(&self) -> Result<CouponSection> {
        let status = self.validator.guard().status()?;
        let warning = (status.state == GuardState::Warned).then(|| {
            format!("{} attempt(s) left before coupon entry is temporarily blocked", status.remaining_attempts)
        });
        Ok(CouponSection {
            state: status.state,
            remaining_attempts: status.remaining_attempts,
            blocked_until: status.block_end,
            applied: self.applied.clone(),
            error: self.coupon_error.clone(),
            warning,
        })
    }

    pub fn can_proceed<C: CartSource + ?Sized>(&self, cart: &C) -> bool {
        self.address.is_confirmed() && !cart.line_items().is_empty()
    }

    pub fn view<C: CartSource + ?Sized>(&self, cart: &C) -> Result<CheckoutView> {
        let pricing = self.pricing(cart);
        Ok(CheckoutView {
            checkout_id: self.id.clone(),
            items: cart.line_items().to_vec(),
            address: AddressSection {
                mode: self.address.mode(),
                address: self.address.address().clone(),
                errors: self.address.errors().clone(),
                submitted: self.address.has_been_submitted(),
            },
            coupon: self.coupon_section()?,
            breakdown: pricing.breakdown(&self.options.currency),
            pricing,
            can_proceed: self.can_proceed(cart),
        })
    }

    /// The only way out to payment. Requires a confirmed address and a non-empty cart.
    pub fn proceed_to_payment<C: CartSource + ?Sized>(&mut self, cart: &C) -> Result<PaymentRedirect> {
        if !self.address.is_confirmed() {
            return Err(CheckoutError::AddressNotSubmitted);
        }
        if cart.line_items().is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let total = self.pricing(cart).total;
        tracing::info!(checkout_id = %self.id, %total, "handing off to payment");
        self.raise_event(CheckoutEvent::PaymentRequested { checkout_id: self.id.clone(), total });
        Ok(PaymentRedirect { checkout_id: self.id.clone(), route: self.options.payment_route.clone(), total })
    }

    pub fn take_events(&mut self) -> Vec<CheckoutEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: CheckoutEvent) { self.events.push(e); }
}
