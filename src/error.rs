//! Error types shared across the checkout crate

use thiserror::Error;

use crate::domain::value_objects::{QuantityError, UnitPriceError};

#[derive(Error, Debug)]
pub enum CartError {
    #[error("Cart item not found: {0}")]
    ItemNotFound(String),

    #[error(transparent)]
    InvalidQuantity(#[from] QuantityError),

    #[error(transparent)]
    InvalidPrice(#[from] UnitPriceError),

    #[error("Cart subtotal would exceed {0}")]
    SubtotalTooLarge(rust_decimal::Decimal),
}

/// Failure of the durable key-value store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("State store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("State store lock poisoned")]
    Poisoned,
}

/// Failure talking to the campaign lookup service. Never a "not found".
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Campaign lookup timed out")]
    Timeout,

    #[error("Campaign lookup transport error: {0}")]
    Transport(String),

    #[error("Campaign lookup returned status {0}")]
    Status(u16),

    #[error("Campaign lookup returned malformed data: {0}")]
    Decode(String),
}

#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error("Shipping address can't be changed while under review")]
    AddressLocked,

    #[error("Shipping address must be submitted before payment")]
    AddressNotSubmitted,

    #[error("Cart is empty")]
    EmptyCart,
}

pub type Result<T> = std::result::Result<T, CheckoutError>;
