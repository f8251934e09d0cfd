//! Discount Code Aggregate and validator

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::value_objects::{CouponCode, Email};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    Percentage,
    Fixed,
    /// Zeroes shipping instead of reducing the subtotal.
    FreeShipping,
}

impl DiscountKind {
    /// Amount taken off `subtotal`, never more than the subtotal itself.
    pub fn amount(&self, value: Decimal, subtotal: Decimal) -> Decimal {
        let subtotal = subtotal.max(Decimal::ZERO);
        match self {
            Self::Percentage => (subtotal * value / Decimal::ONE_HUNDRED).min(subtotal).max(Decimal::ZERO),
            Self::Fixed => value.min(subtotal).max(Decimal::ZERO),
            Self::FreeShipping => Decimal::ZERO,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountCode {
    pub code: CouponCode,
    #[serde(rename = "type")]
    pub kind: DiscountKind,
    pub value: Decimal,
    pub min_purchase: Option<Decimal>,
    pub max_uses: Option<u32>,
    pub used_count: u32,
    pub used_by_emails: Vec<String>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub is_active: bool,
    pub is_first_order_only: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDiscount {
    pub code: String,
    #[serde(rename = "type")]
    pub kind: DiscountKind,
    pub value: Decimal,
    pub min_purchase: Option<Decimal>,
    pub max_uses: Option<u32>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    #[serde(default)]
    pub is_first_order_only: bool,
}

/// Snapshot of a code that passed validation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedDiscount {
    pub code: CouponCode,
    #[serde(rename = "type")]
    pub kind: DiscountKind,
    pub value: Decimal,
    pub discount_amount: Decimal,
}

/// Wire shape of a validation answer: `{valid, error}` or `{valid, discountCode}`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_code: Option<ValidatedDiscount>,
}

impl From<Result<ValidatedDiscount, DiscountRejection>> for DiscountValidation {
    fn from(result: Result<ValidatedDiscount, DiscountRejection>) -> Self {
        match result {
            Ok(d) => Self { valid: true, error: None, discount_code: Some(d) },
            Err(e) => Self { valid: false, error: Some(e.to_string()), discount_code: None },
        }
    }
}

/// Checks a code in order, stopping at the first failure.
pub fn validate(code: Option<&DiscountCode>, email: Option<&Email>, subtotal: Decimal, now: DateTime<Utc>) -> Result<ValidatedDiscount, DiscountRejection> {
    let code = code.ok_or(DiscountRejection::Invalid)?;
    code.validate(email, subtotal, now)
}

impl DiscountCode {
    pub fn create(new: NewDiscount) -> Result<Self, DiscountRejection> {
        if new.value.is_sign_negative() { return Err(DiscountRejection::Malformed("value must not be negative")); }
        if new.kind == DiscountKind::Percentage && new.value > Decimal::ONE_HUNDRED {
            return Err(DiscountRejection::Malformed("percentage must be at most 100"));
        }
        if new.valid_until <= new.valid_from { return Err(DiscountRejection::Malformed("validity window is empty")); }
        let code = CouponCode::new(new.code).map_err(|_| DiscountRejection::Invalid)?;
        Ok(Self {
            code, kind: new.kind, value: new.value, min_purchase: new.min_purchase, max_uses: new.max_uses,
            used_count: 0, used_by_emails: vec![], valid_from: new.valid_from, valid_until: new.valid_until,
            is_active: true, is_first_order_only: new.is_first_order_only,
        })
    }

    pub fn validate(&self, email: Option<&Email>, subtotal: Decimal, now: DateTime<Utc>) -> Result<ValidatedDiscount, DiscountRejection> {
        if !self.is_active { return Err(DiscountRejection::Inactive); }
        if now < self.valid_from { return Err(DiscountRejection::NotYetActive); }
        if now > self.valid_until { return Err(DiscountRejection::Expired); }
        if self.limit_reached() { return Err(DiscountRejection::UsageLimitReached); }
        if let Some(min) = self.min_purchase {
            if subtotal < min { return Err(DiscountRejection::MinimumPurchase(min)); }
        }
        if let Some(email) = email {
            if self.is_first_order_only && self.used_by(email) { return Err(DiscountRejection::FirstOrderOnly); }
        }
        Ok(ValidatedDiscount { code: self.code.clone(), kind: self.kind, value: self.value, discount_amount: self.kind.amount(self.value, subtotal) })
    }

    /// Consumes one use. Callers must run this atomically against the stored record.
    pub fn redeem(&mut self, email: &Email) -> Result<(), DiscountRejection> {
        if self.limit_reached() { return Err(DiscountRejection::UsageLimitReached); }
        if self.is_first_order_only && self.used_by(email) { return Err(DiscountRejection::FirstOrderOnly); }
        self.used_count += 1;
        self.used_by_emails.push(email.to_string());
        Ok(())
    }

    pub fn deactivate(&mut self) { self.is_active = false; }

    pub fn limit_reached(&self) -> bool {
        self.max_uses.is_some_and(|max| self.used_count >= max)
    }

    fn used_by(&self, email: &Email) -> bool {
        self.used_by_emails.iter().any(|e| e.eq_ignore_ascii_case(email.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscountRejection {
    #[error("Invalid discount code")]
    Invalid,
    #[error("This discount code is no longer active")]
    Inactive,
    #[error("This discount code is not yet active")]
    NotYetActive,
    #[error("This discount code has expired")]
    Expired,
    #[error("This discount code has reached its usage limit")]
    UsageLimitReached,
    #[error("Minimum purchase of ${0:.2} required")]
    MinimumPurchase(Decimal),
    #[error("This discount code is for first orders only")]
    FirstOrderOnly,
    #[error("invalid discount: {0}")]
    Malformed(&'static str),
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    pub(crate) fn code(raw: &str, kind: DiscountKind, value: Decimal) -> DiscountCode {
        let now = Utc::now();
        DiscountCode::create(NewDiscount {
            code: raw.into(), kind, value, min_purchase: None, max_uses: None,
            valid_from: now - Duration::days(1), valid_until: now + Duration::days(30), is_first_order_only: false,
        }).unwrap()
    }

    fn email(s: &str) -> Email { Email::new(s).unwrap() }

    #[test]
    fn test_amounts() {
        assert_eq!(DiscountKind::Percentage.amount(dec!(10), dec!(69.98)), dec!(6.998));
        assert_eq!(DiscountKind::Percentage.amount(dec!(150), dec!(20)), dec!(20));
        assert_eq!(DiscountKind::Fixed.amount(dec!(15), dec!(10)), dec!(10));
        assert_eq!(DiscountKind::Fixed.amount(dec!(5), dec!(10)), dec!(5));
        assert_eq!(DiscountKind::FreeShipping.amount(dec!(5), dec!(10)), Decimal::ZERO);
    }

    #[test]
    fn test_unknown_code() {
        assert_eq!(validate(None, None, dec!(10), Utc::now()), Err(DiscountRejection::Invalid));
    }

    #[test]
    fn test_usage_limit_wins_even_when_everything_else_passes() {
        let mut c = code("once", DiscountKind::Fixed, dec!(5));
        c.max_uses = Some(1);
        c.used_count = 1;
        assert_eq!(c.validate(Some(&email("new@example.com")), dec!(100), Utc::now()), Err(DiscountRejection::UsageLimitReached));
    }

    #[test]
    fn test_checks_short_circuit_in_order() {
        let mut c = code("late", DiscountKind::Fixed, dec!(5));
        c.is_active = false;
        c.max_uses = Some(0);
        assert_eq!(c.validate(None, dec!(1), Utc::now()), Err(DiscountRejection::Inactive));
        c.is_active = true;
        c.valid_from = Utc::now() + Duration::days(1);
        assert_eq!(c.validate(None, dec!(1), Utc::now()), Err(DiscountRejection::NotYetActive));
        c.valid_from = Utc::now() - Duration::days(10);
        c.valid_until = Utc::now() - Duration::days(1);
        assert_eq!(c.validate(None, dec!(1), Utc::now()), Err(DiscountRejection::Expired));
    }

    #[test]
    fn test_minimum_purchase_message() {
        let mut c = code("big", DiscountKind::Percentage, dec!(20));
        c.min_purchase = Some(dec!(75));
        let err = c.validate(None, dec!(50), Utc::now()).unwrap_err();
        assert_eq!(err.to_string(), "Minimum purchase of $75.00 required");
        assert!(c.validate(None, dec!(75), Utc::now()).is_ok());
    }

    #[test]
    fn test_first_order_only() {
        let mut c = code("welcome", DiscountKind::Percentage, dec!(15));
        c.is_first_order_only = true;
        c.redeem(&email("a@example.com")).unwrap();
        assert_eq!(c.validate(Some(&email("A@Example.com")), dec!(30), Utc::now()), Err(DiscountRejection::FirstOrderOnly));
        assert!(c.validate(Some(&email("b@example.com")), dec!(30), Utc::now()).is_ok());
        assert!(c.validate(None, dec!(30), Utc::now()).is_ok());
        assert_eq!(c.redeem(&email("a@example.com")), Err(DiscountRejection::FirstOrderOnly));
    }

    #[test]
    fn test_redeem_respects_max_uses() {
        let mut c = code("two", DiscountKind::Fixed, dec!(5));
        c.max_uses = Some(2);
        c.redeem(&email("a@example.com")).unwrap();
        c.redeem(&email("b@example.com")).unwrap();
        assert_eq!(c.redeem(&email("c@example.com")), Err(DiscountRejection::UsageLimitReached));
        assert_eq!(c.used_count, 2);
    }

    #[test]
    fn test_create_upper_cases_and_rejects_bad_percentage() {
        assert_eq!(code("save10", DiscountKind::Percentage, dec!(10)).code.as_str(), "SAVE10");
        let now = Utc::now();
        let bad = DiscountCode::create(NewDiscount {
            code: "X".into(), kind: DiscountKind::Percentage, value: dec!(120), min_purchase: None, max_uses: None,
            valid_from: now, valid_until: now + Duration::days(1), is_first_order_only: false,
        });
        assert!(bad.is_err());
    }

    #[test]
    fn test_validation_wire_shape() {
        let ok = DiscountValidation::from(code("save10", DiscountKind::Percentage, dec!(10)).validate(None, dec!(69.98), Utc::now()));
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["valid"], true);
        assert_eq!(json["discountCode"]["type"], "percentage");
        let bad = DiscountValidation::from(validate(None, None, dec!(1), Utc::now()));
        assert_eq!(serde_json::to_value(&bad).unwrap()["error"], "Invalid discount code");
    }
}
