//! Aggregates module
pub mod address;
pub mod cart;
pub mod checkout;

pub use address::{AddressForm, FieldErrors, FormMode, ShippingAddress};
pub use cart::{Cart, CartLineItem, CartSource, SelectedVariant};
pub use checkout::{CheckoutOptions, CheckoutSession, CheckoutView, CouponSection, PaymentRedirect};
