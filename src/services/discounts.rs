//! Discount validation and administration.

use chrono::Utc;
use rust_decimal::Decimal;

use super::AppState;
use crate::domain::aggregates::{self, DiscountCode, DiscountRejection, NewDiscount, ValidatedDiscount};
use crate::domain::value_objects::{CouponCode, Email};
use crate::{Result, StorefrontError};

/// Checks a shopper-entered code. A malformed or unknown code is a rejection, not an error.
pub async fn check(state: &AppState, code: &str, email: Option<&Email>, subtotal: Decimal) -> Result<std::result::Result<ValidatedDiscount, DiscountRejection>> {
    let Ok(code) = CouponCode::new(code) else { return Ok(Err(DiscountRejection::Invalid)) };
    let stored = state.store.get_discount(&code).await?;
    Ok(aggregates::validate(stored.as_ref(), email, subtotal, Utc::now()))
}

pub async fn create(state: &AppState, new: NewDiscount) -> Result<DiscountCode> {
    let discount = DiscountCode::create(new)?;
    state.store.insert_discount(&discount).await?;
    tracing::info!(code = %discount.code, kind = ?discount.kind, "discount code created");
    Ok(discount)
}

pub async fn list(state: &AppState) -> Result<Vec<DiscountCode>> {
    Ok(state.store.list_discounts().await?)
}

pub async fn deactivate(state: &AppState, code: &str) -> Result<DiscountCode> {
    let code = CouponCode::new(code).map_err(|_| StorefrontError::not_found("Discount code not found"))?;
    let mut discount = state.store.get_discount(&code).await?.ok_or_else(|| StorefrontError::not_found("Discount code not found"))?;
    discount.deactivate();
    state.store.save_discount(&discount).await?;
    Ok(discount)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::aggregates::DiscountKind;
    use crate::services::tests::memory_state;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    pub(crate) fn new_discount(code: &str, kind: DiscountKind, value: Decimal) -> NewDiscount {
        NewDiscount {
            code: code.into(), kind, value, min_purchase: None, max_uses: None,
            valid_from: Utc::now() - Duration::days(1), valid_until: Utc::now() + Duration::days(30), is_first_order_only: false,
        }
    }

    #[tokio::test]
    async fn test_check_is_case_insensitive() {
        let state = memory_state();
        create(&state, new_discount("SAVE10", DiscountKind::Percentage, dec!(10))).await.unwrap();
        let ok = check(&state, "save10", None, dec!(69.98)).await.unwrap().unwrap();
        assert_eq!(ok.discount_amount, dec!(6.998));
        assert_eq!(check(&state, "nope", None, dec!(10)).await.unwrap().unwrap_err(), DiscountRejection::Invalid);
        assert_eq!(check(&state, "   ", None, dec!(10)).await.unwrap().unwrap_err(), DiscountRejection::Invalid);
    }

    #[tokio::test]
    async fn test_deactivated_code_is_rejected() {
        let state = memory_state();
        create(&state, new_discount("BYE", DiscountKind::Fixed, dec!(5))).await.unwrap();
        deactivate(&state, "bye").await.unwrap();
        assert_eq!(check(&state, "BYE", None, dec!(10)).await.unwrap().unwrap_err(), DiscountRejection::Inactive);
        assert!(matches!(deactivate(&state, "missing").await, Err(StorefrontError::NotFound(_))));
    }
}
