//! Shipping address collector.
//!
//! The form is either being edited or shown back for review. Only a submit
//! that passes validation moves it to review; "Edit" moves it back with the
//! entered values intact.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::error::CheckoutError;

/// Digits in a postal PIN code for the supported country.
pub const PIN_CODE_DIGITS: usize = 6;
pub const SUPPORTED_COUNTRY: &str = "India";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct ShippingAddress {
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,
    #[validate(length(min = 1, message = "Address is required"))]
    pub address: String,
    pub apartment: Option<String>,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(custom = "validate_pin_code")]
    pub zip: String,
    #[validate(length(min = 1, message = "Country is required"))]
    pub country: String,
    #[validate(custom = "validate_phone")]
    pub phone: String,
    pub customer_note: Option<String>,
}

impl ShippingAddress {
    /// Copy with surrounding whitespace removed from every field.
    pub fn trimmed(&self) -> Self {
        let t = |s: &str| s.trim().to_string();
        let opt = |s: &Option<String>| s.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        Self {
            email: t(&self.email),
            first_name: t(&self.first_name),
            last_name: t(&self.last_name),
            address: t(&self.address),
            apartment: opt(&self.apartment),
            city: t(&self.city),
            zip: t(&self.zip),
            country: t(&self.country),
            phone: t(&self.phone),
            customer_note: opt(&self.customer_note),
        }
    }
}

fn validate_pin_code(zip: &str) -> Result<(), ValidationError> {
    if zip.is_empty() {
        return Err(field_error("required", "PIN code is required"));
    }
    if zip.len() != PIN_CODE_DIGITS || !zip.bytes().all(|b| b.is_ascii_digit()) {
        return Err(field_error("pin_code", "PIN code must be exactly 6 digits"));
    }
    Ok(())
}

fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    if phone.is_empty() {
        return Err(field_error("required", "Phone number is required"));
    }
    let digits = phone.strip_prefix('+').unwrap_or(phone).chars().filter(|c| !matches!(c, ' ' | '-')).collect::<String>();
    if digits.len() < 10 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(field_error("phone", "Enter a valid phone number"));
    }
    Ok(())
}

fn field_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut e = ValidationError::new(code);
    e.message = Some(message.into());
    e
}

/// Field name to first error message, in camelCase to match the form.
pub type FieldErrors = BTreeMap<String, String>;

fn flatten(errors: &ValidationErrors) -> FieldErrors {
    errors
        .field_errors()
        .into_iter()
        .filter_map(|(field, errs)| {
            let message = errs.first().map(|e| e.message.as_ref().map(|m| m.to_string()).unwrap_or_else(|| e.code.to_string()))?;
            Some((camel_case(field), message))
        })
        .collect()
}

fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' { upper = true; continue; }
        if upper { out.extend(c.to_uppercase()); upper = false; } else { out.push(c); }
    }
    out
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormMode {
    #[default]
    Editing,
    Reviewing,
}

#[derive(Clone, Debug, Default)]
pub struct AddressForm {
    address: ShippingAddress,
    mode: FormMode,
    submitted: bool,
    errors: FieldErrors,
}

impl AddressForm {
    pub fn new() -> Self { Self::default() }

    pub fn address(&self) -> &ShippingAddress { &self.address }
    pub fn mode(&self) -> FormMode { self.mode }
    pub fn errors(&self) -> &FieldErrors { &self.errors }

    /// True once a submit has succeeded, even if the shopper went back to edit.
    pub fn has_been_submitted(&self) -> bool { self.submitted }

    /// Submitted and currently under review.
    pub fn is_confirmed(&self) -> bool { self.submitted && self.mode == FormMode::Reviewing }

    /// Replaces the form values. Only allowed while editing.
    pub fn update(&mut self, address: ShippingAddress) -> Result<(), CheckoutError> {
        if self.mode != FormMode::Editing {
            return Err(CheckoutError::AddressLocked);
        }
        self.address = address;
        Ok(())
    }

    /// Validates and, on success, moves to review. On failure the form stays
    /// in editing with one message per failing field.
    pub fn submit(&mut self) -> Result<(), FieldErrors> {
        if self.mode == FormMode::Reviewing {
            return Ok(());
        }
        let candidate = self.address.trimmed();
        if let Err(errors) = candidate.validate() {
            self.errors = flatten(&errors);
            return Err(self.errors.clone());
        }
        self.address = candidate;
        self.errors.clear();
        self.mode = FormMode::Reviewing;
        self.submitted = true;
        tracing::info!(city = %self.address.city, zip = %self.address.zip, "shipping address submitted");
        Ok(())
    }

    pub fn edit(&mut self) { self.mode = FormMode::Editing; }
}

#[cfg(test)]
pub(crate) fn sample_address() -> ShippingAddress {
    ShippingAddress {
        email: "asha@example.in".into(),
        first_name: "Asha".into(),
        last_name: "Rao".into(),
        address: "12 MG Road".into(),
        apartment: Some("Flat 4B".into()),
        city: "Bengaluru".into(),
        zip: "560001".into(),
        country: SUPPORTED_COUNTRY.into(),
        phone: "+91 98765 43210".into(),
        customer_note: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_empty_in_editing() {
        let form = AddressForm::new();
        assert_eq!(form.mode(), FormMode::Editing);
        assert_eq!(form.address(), &ShippingAddress::default());
        assert!(!form.has_been_submitted());
    }

    #[test]
    fn test_five_digit_pin_stays_in_editing() {
        let mut form = AddressForm::new();
        form.update(ShippingAddress { zip: "56000".into(), ..sample_address() }).unwrap();
        let errors = form.submit().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.get("zip").map(String::as_str), Some("PIN code must be exactly 6 digits"));
        assert_eq!(form.mode(), FormMode::Editing);
        assert!(!form.is_confirmed());
    }

    #[test]
    fn test_missing_fields_each_get_a_message() {
        let mut form = AddressForm::new();
        let errors = form.submit().unwrap_err();
        for field in ["email", "firstName", "lastName", "address", "city", "zip", "country", "phone"] {
            assert!(errors.contains_key(field), "missing error for {}", field);
        }
        assert!(!errors.contains_key("apartment"));
        assert_eq!(form.errors(), &errors);
    }

    #[test]
    fn test_whitespace_only_counts_as_missing() {
        let mut form = AddressForm::new();
        form.update(ShippingAddress { city: "   ".into(), ..sample_address() }).unwrap();
        assert!(form.submit().unwrap_err().contains_key("city"));
    }

    #[test]
    fn test_edit_round_trip_keeps_values() {
        let mut form = AddressForm::new();
        form.update(sample_address()).unwrap();
        form.submit().unwrap();
        assert_eq!(form.mode(), FormMode::Reviewing);
        assert!(form.is_confirmed());
        assert!(matches!(form.update(ShippingAddress::default()), Err(CheckoutError::AddressLocked)));
        form.edit();
        assert_eq!(form.mode(), FormMode::Editing);
        assert_eq!(form.address(), &sample_address());
        assert!(form.has_been_submitted());
        assert!(!form.is_confirmed());
    }

    #[test]
    fn test_errors_clear_after_fix() {
        let mut form = AddressForm::new();
        form.update(ShippingAddress { zip: "abc123".into(), ..sample_address() }).unwrap();
        assert!(form.submit().is_err());
        form.update(sample_address()).unwrap();
        form.submit().unwrap();
        assert!(form.errors().is_empty());
    }
}
