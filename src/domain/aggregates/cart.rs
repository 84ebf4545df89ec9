//! Cart Aggregate
//!
//! The cart is owned outside the checkout workflow. Checkout only reads it
//! through [`CartSource`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::{Quantity, UnitPrice};
use crate::error::CartError;

/// Brand and model the skin was cut for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedVariant { pub brand: String, pub model: String }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineItem {
    pub id: String,
    pub name: String,
    pub unit_price: UnitPrice,
    pub quantity: Quantity,
    pub image_ref: String,
    #[serde(default)]
    pub selected_variant: Option<SelectedVariant>,
}

impl CartLineItem {
    /// Bounded by `UnitPrice::MAX * u32::MAX`, well inside `Decimal` range.
    pub fn line_total(&self) -> Decimal { self.unit_price.value() * Decimal::from(self.quantity.value()) }

    fn same_line(&self, other: &CartLineItem) -> bool {
        self.id == other.id && self.selected_variant == other.selected_variant
    }
}

/// Read-only view of the cart consumed by checkout.
pub trait CartSource {
    fn line_items(&self) -> &[CartLineItem];

    fn raw_subtotal(&self) -> Decimal {
        self.line_items().iter().map(CartLineItem::line_total).sum()
    }
}

#[derive(Clone, Debug)]
pub struct Cart {
    id: String,
    items: Vec<CartLineItem>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Default for Cart {
    fn default() -> Self { Self::new() }
}

impl Cart {
    pub fn new() -> Self {
        let now = Utc::now();
        Self { id: Uuid::new_v4().to_string(), items: vec![], created_at: now, updated_at: now }
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    /// Upper bound on the cart subtotal, so pricing never leaves `Decimal` range.
    pub const MAX_SUBTOTAL: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

    /// Adds a line, merging with an existing line for the same product and variant.
    /// The cart is left unchanged when the result would exceed [`Cart::MAX_SUBTOTAL`].
    pub fn add_item(&mut self, item: CartLineItem) -> Result<(), CartError> {
        match self.items.iter().position(|i| i.same_line(&item)) {
            Some(pos) => {
                let existing = &self.items[pos];
                let merged = CartLineItem { quantity: existing.quantity.add(item.quantity), ..existing.clone() };
                self.ensure_within_limit(existing.line_total(), merged.line_total())?;
                self.items[pos] = merged;
            }
            None => {
                self.ensure_within_limit(Decimal::ZERO, item.line_total())?;
                self.items.push(item);
            }
        }
        self.touch();
        Ok(())
    }

    /// Sets the quantity of the first line with `item_id`. Zero removes the line.
    pub fn update_quantity(&mut self, item_id: &str, quantity: u32) -> Result<(), CartError> {
        let pos = self.items.iter().position(|i| i.id == item_id).ok_or_else(|| CartError::ItemNotFound(item_id.to_string()))?;
        if quantity == 0 {
            self.items.remove(pos);
        } else {
            let quantity = Quantity::new(quantity)?;
            let current = &self.items[pos];
            let updated = CartLineItem { quantity, ..current.clone() };
            self.ensure_within_limit(current.line_total(), updated.line_total())?;
            self.items[pos] = updated;
        }
        self.touch();
        Ok(())
    }

    pub fn remove_item(&mut self, item_id: &str) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| i.id != item_id);
        if self.items.len() == before { return Err(CartError::ItemNotFound(item_id.to_string())); }
        self.touch();
        Ok(())
    }

    pub fn clear(&mut self) { self.items.clear(); self.touch(); }

    fn touch(&mut self) { self.updated_at = Utc::now(); }

    /// Checks the subtotal after swapping a line total of `old` for `new`.
    fn ensure_within_limit(&self, old: Decimal, new: Decimal) -> Result<(), CartError> {
        match self.raw_subtotal().checked_sub(old).and_then(|rest| rest.checked_add(new)) {
            Some(total) if total <= Self::MAX_SUBTOTAL => Ok(()),
            _ => Err(CartError::SubtotalTooLarge(Self::MAX_SUBTOTAL)),
        }
    }
}

impl CartSource for Cart {
    fn line_items(&self) -> &[CartLineItem] { &self.items }
}

#[cfg(test)]
pub(crate) fn line(id: &str, price: i64, qty: u32) -> CartLineItem {
    CartLineItem {
        id: id.into(),
        name: format!("{} skin", id),
        unit_price: UnitPrice::new(Decimal::new(price, 0)).unwrap(),
        quantity: Quantity::new(qty).unwrap(),
        image_ref: format!("/img/{}.webp", id),
        selected_variant: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_operations() {
        let mut cart = Cart::new();
        cart.add_item(line("P1", 250, 2)).unwrap();
        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.raw_subtotal(), Decimal::new(500, 0));
        cart.add_item(line("P1", 250, 1)).unwrap();
        assert_eq!(cart.line_items()[0].quantity.value(), 3); // merged
        cart.update_quantity("P1", 0).unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_variants_are_separate_lines() {
        let mut cart = Cart::new();
        let mut a = line("SKIN", 499, 1);
        a.selected_variant = Some(SelectedVariant { brand: "Apple".into(), model: "iPhone 15".into() });
        let mut b = a.clone();
        b.selected_variant = Some(SelectedVariant { brand: "Samsung".into(), model: "S24".into() });
        cart.add_item(a).unwrap();
        cart.add_item(b).unwrap();
        assert_eq!(cart.item_count(), 2);
    }

    #[test]
    fn test_missing_item_is_reported() {
        let mut cart = Cart::new();
        assert!(matches!(cart.remove_item("nope"), Err(CartError::ItemNotFound(_))));
        assert!(matches!(cart.update_quantity("nope", 2), Err(CartError::ItemNotFound(_))));
    }

    #[test]
    fn test_oversized_cart_is_refused_and_left_unchanged() {
        let mut cart = Cart::new();
        cart.add_item(line("P1", 10_000_000, 50)).unwrap();
        let before = cart.raw_subtotal();

        let err = cart.add_item(line("P2", 10_000_000, u32::MAX)).unwrap_err();
        assert!(matches!(err, CartError::SubtotalTooLarge(_)));
        assert!(matches!(cart.add_item(line("P1", 10_000_000, 100)), Err(CartError::SubtotalTooLarge(_))));
        assert!(matches!(cart.update_quantity("P1", u32::MAX), Err(CartError::SubtotalTooLarge(_))));

        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.line_items()[0].quantity.value(), 50);
        assert_eq!(cart.raw_subtotal(), before);
        cart.update_quantity("P1", 100).unwrap();
        assert_eq!(cart.raw_subtotal(), Cart::MAX_SUBTOTAL);
    }
}
