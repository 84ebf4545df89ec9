//! Skin Store Checkout
//!
//! Checkout workflow for the device skin storefront.
//!
//! ## Features
//! - Price breakdown (subtotal, discount, tax, total)
//! - Coupon validation against the campaign service
//! - Attempt limiting with a temporary lockout that survives reloads
//! - Shipping address collection with edit/review states
//! - Payment hand-off gated on a confirmed address

pub mod api;
pub mod clock;
pub mod config;
pub mod coupon;
pub mod domain;
pub mod error;
pub mod flight;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coupon::{
    AppliedCoupon, AttemptGuard, Coupon, CouponLookup, CouponOutcome, CouponRejection, CouponValidator, GuardPolicy, GuardState,
    GuardStatus, HttpCampaignClient, StaticCampaigns, ValidatorOptions,
};
pub use domain::aggregates::{
    AddressForm, Cart, CartLineItem, CartSource, CheckoutOptions, CheckoutSession, CheckoutView, FormMode, PaymentRedirect,
    SelectedVariant, ShippingAddress,
};
pub use domain::events::CheckoutEvent;
pub use domain::pricing::{PriceBreakdown, PricingSnapshot};
pub use domain::value_objects::{CouponCode, DiscountFraction, Money, Quantity, UnitPrice};
pub use error::{CartError, CheckoutError, LookupError, Result, StoreError};
pub use store::{FileStore, MemoryStore, StateStore};
