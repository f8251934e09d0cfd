//! Cart operations. Every mutation re-reads the cart before patching it.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use super::{discounts, find_cart, update_cart, AppState};
use crate::domain::aggregates::{AppliedDiscount, Cart, CartSummary, PricedLine, Product, UnavailableLine};
use crate::domain::value_objects::Email;
use crate::{Result, StorefrontError};

/// A cart joined with live prices. Lines that can no longer be bought are
/// listed apart and left out of the totals.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub cart: Cart,
    pub lines: Vec<PricedLine>,
    pub unavailable: Vec<UnavailableLine>,
    pub summary: CartSummary,
}

async fn catalog_for(state: &AppState, cart: &Cart) -> Result<HashMap<Uuid, Product>> {
    let ids: Vec<Uuid> = cart.items().iter().map(|i| i.product_id).collect();
    Ok(state.store.get_products(&ids).await?.into_iter().map(|p| (p.id, p)).collect())
}

/// Strict pricing for checkout: every line must still be purchasable.
pub(crate) async fn price(state: &AppState, cart: &Cart) -> Result<(Vec<PricedLine>, CartSummary)> {
    let products = catalog_for(state, cart).await?;
    let lines = cart.price(|id| products.get(id))?;
    let summary = cart.summary(&lines, &state.settings.shipping_policy());
    Ok((lines, summary))
}

async fn view(state: &AppState, cart: Cart) -> Result<CartView> {
    let products = catalog_for(state, &cart).await?;
    let (lines, unavailable) = cart.price_available(|id| products.get(id));
    if !unavailable.is_empty() {
        tracing::debug!(cart_id = %cart.id(), count = unavailable.len(), "cart holds unavailable lines");
    }
    let summary = cart.summary(&lines, &state.settings.shipping_policy());
    Ok(CartView { cart, lines, unavailable, summary })
}

/// The shopper's cart, or an unsaved empty one; carts are stored on first write.
pub async fn get(state: &AppState, session_id: &str, user_id: Option<&str>) -> Result<CartView> {
    let cart = match find_cart(state, session_id, user_id).await? {
        Some(cart) => cart,
        None => Cart::new(session_id, user_id.map(str::to_string), Utc::now()),
    };
    view(state, cart).await
}

pub async fn add_item(state: &AppState, session_id: &str, user_id: Option<&str>, product_id: Uuid, variant_id: &str, quantity: u32) -> Result<CartView> {
    let product = state.store.get_product(product_id).await?.ok_or_else(|| StorefrontError::not_found("Product not found"))?;
    let (cart, ()) = update_cart(state, session_id, user_id, |cart| {
        let existing = cart.items().iter()
            .find(|i| i.product_id == product_id && i.variant_id == variant_id)
            .map_or(0, |i| i.quantity);
        product.purchasable_variant(variant_id, existing.saturating_add(quantity))?;
        cart.add_item(product_id, variant_id, quantity, Utc::now())?;
        Ok(())
    }).await?;
    view(state, cart).await
}

pub async fn update_quantity(state: &AppState, session_id: &str, user_id: Option<&str>, line_id: Uuid, quantity: i64) -> Result<CartView> {
    let (cart, ()) = update_cart(state, session_id, user_id, |cart| Ok(cart.update_quantity(line_id, quantity, Utc::now())?)).await?;
    view(state, cart).await
}

pub async fn remove_item(state: &AppState, session_id: &str, user_id: Option<&str>, line_id: Uuid) -> Result<CartView> {
    let (cart, ()) = update_cart(state, session_id, user_id, |cart| Ok(cart.remove_item(line_id, Utc::now())?)).await?;
    view(state, cart).await
}

/// Validates against the live subtotal and replaces any applied code.
pub async fn apply_discount(state: &AppState, session_id: &str, user_id: Option<&str>, code: &str, email: Option<&Email>) -> Result<CartView> {
    let current = get(state, session_id, user_id).await?;
    let validated = discounts::check(state, code, email, current.summary.subtotal).await??;
    let applied = AppliedDiscount { code: validated.code, kind: validated.kind, value: validated.value };
    let (cart, ()) = update_cart(state, session_id, user_id, |cart| {
        cart.apply_discount(applied.clone(), Utc::now());
        Ok(())
    }).await?;
    view(state, cart).await
}

pub async fn remove_discount(state: &AppState, session_id: &str, user_id: Option<&str>) -> Result<CartView> {
    let (cart, ()) = update_cart(state, session_id, user_id, |cart| {
        cart.remove_discount(Utc::now());
        Ok(())
    }).await?;
    view(state, cart).await
}

pub async fn clear(state: &AppState, session_id: &str, user_id: Option<&str>) -> Result<CartView> {
    let (cart, ()) = update_cart(state, session_id, user_id, |cart| {
        cart.clear(Utc::now());
        Ok(())
    }).await?;
    view(state, cart).await
}

/// Folds the session's guest cart into the user's cart, then deletes the guest cart.
pub async fn merge(state: &AppState, session_id: &str, user_id: &str) -> Result<CartView> {
    let guest = state.store.find_cart_by_session(session_id).await?.filter(|c| c.user_id().is_none());
    let Some(guest) = guest else { return get(state, session_id, Some(user_id)).await };

    let user_cart = state.store.find_cart_by_user(user_id).await?;
    let Some(user_cart) = user_cart else {
        // no user cart yet: the guest cart becomes it
        let (cart, ()) = update_cart(state, session_id, Some(user_id), |_| Ok(())).await?;
        return view(state, cart).await;
    };

    let (cart, ()) = update_cart(state, user_cart.session_id(), Some(user_id), |cart| {
        cart.merge(&guest, Utc::now());
        Ok(())
    }).await?;
    state.store.delete_cart(guest.id()).await?;
    tracing::info!(user_id, guest_cart = %guest.id(), cart_id = %cart.id(), "guest cart merged");
    view(state, cart).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::tests::{new_product, variant};
    use crate::domain::aggregates::{DiscountKind, FulfillmentType, NewProduct};
    use crate::services::catalog;
    use crate::services::discounts::tests::new_discount;
    use crate::services::tests::memory_state;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn plush() -> NewProduct {
        new_product("Plush Set", FulfillmentType::Manual, vec![variant("std", "DB-PLUSH-001", dec!(34.99), dec!(12))])
    }

    #[tokio::test]
    async fn test_add_twice_folds_into_one_line() {
        let state = memory_state();
        let p = catalog::create_product(&state, plush()).await.unwrap();
        add_item(&state, "s1", None, p.id, "std", 1).await.unwrap();
        let view = add_item(&state, "s1", None, p.id, "std", 2).await.unwrap();
        assert_eq!(view.cart.items().len(), 1);
        assert_eq!(view.cart.items()[0].quantity, 3);
        assert_eq!(view.summary.subtotal, dec!(104.97));
    }

    #[tokio::test]
    async fn test_stock_is_enforced_across_adds() {
        let state = memory_state();
        let mut v = variant("std", "KEY-1", dec!(9), dec!(2));
        v.stock = Some(2);
        let p = catalog::create_product(&state, new_product("Keychain", FulfillmentType::Dropship, vec![v])).await.unwrap();
        add_item(&state, "s1", None, p.id, "std", 2).await.unwrap();
        assert!(matches!(add_item(&state, "s1", None, p.id, "std", 1).await, Err(StorefrontError::Validation(_))));
    }

    #[tokio::test]
    async fn test_discount_apply_and_remove_round_trip() {
        let state = memory_state();
        let p = catalog::create_product(&state, plush()).await.unwrap();
        discounts::create(&state, new_discount("SAVE10", DiscountKind::Percentage, dec!(10))).await.unwrap();
        let before = add_item(&state, "s1", None, p.id, "std", 2).await.unwrap();
        assert_eq!(before.summary.shipping, Decimal::ZERO);
        assert_eq!(before.summary.total, dec!(69.98));

        let with = apply_discount(&state, "s1", None, "save10", None).await.unwrap();
        assert_eq!(with.summary.discount_amount, dec!(6.998));
        assert_eq!(with.summary.total, dec!(62.982));

        let after = remove_discount(&state, "s1", None).await.unwrap();
        assert_eq!(after.summary, before.summary);
    }

    #[tokio::test]
    async fn test_rejected_discount_leaves_cart_alone() {
        let state = memory_state();
        let p = catalog::create_product(&state, plush()).await.unwrap();
        let mut min = new_discount("BIG", DiscountKind::Fixed, dec!(10));
        min.min_purchase = Some(dec!(100));
        discounts::create(&state, min).await.unwrap();
        add_item(&state, "s1", None, p.id, "std", 1).await.unwrap();
        let err = apply_discount(&state, "s1", None, "BIG", None).await.unwrap_err();
        assert_eq!(err.to_string(), "Minimum purchase of $100.00 required");
        assert!(get(&state, "s1", None).await.unwrap().cart.applied_discount().is_none());
    }

    #[tokio::test]
    async fn test_deactivated_product_does_not_lock_the_cart() {
        let state = memory_state();
        let plush = catalog::create_product(&state, plush()).await.unwrap();
        let mug = catalog::create_product(&state, new_product("Mug", FulfillmentType::Manual, vec![variant("std", "MUG-1", dec!(15), dec!(5))])).await.unwrap();
        add_item(&state, "s1", None, plush.id, "std", 1).await.unwrap();
        add_item(&state, "s1", None, mug.id, "std", 1).await.unwrap();
        catalog::deactivate_product(&state, plush.id).await.unwrap();

        let view = get(&state, "s1", None).await.unwrap();
        assert_eq!(view.lines.len(), 1);
        assert_eq!(view.unavailable.len(), 1);
        assert_eq!(view.unavailable[0].product_id, plush.id);
        assert_eq!(view.summary.subtotal, dec!(15));

        let mug_line = view.lines[0].line_id;
        let after = remove_item(&state, "s1", None, mug_line).await.unwrap();
        assert!(after.lines.is_empty());
        let stale = after.unavailable[0].line_id;
        assert!(remove_item(&state, "s1", None, stale).await.unwrap().cart.is_empty());
    }

    #[tokio::test]
    async fn test_merge_sums_lines_and_deletes_guest_cart() {
        let state = memory_state();
        let p = catalog::create_product(&state, plush()).await.unwrap();
        add_item(&state, "user-session", Some("u1"), p.id, "std", 1).await.unwrap();
        let guest = add_item(&state, "guest-session", None, p.id, "std", 2).await.unwrap();

        let merged = merge(&state, "guest-session", "u1").await.unwrap();
        assert_eq!(merged.cart.items().len(), 1);
        assert_eq!(merged.cart.items()[0].quantity, 3);
        assert!(state.store.get_cart(guest.cart.id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_merge_without_user_cart_adopts_guest_cart() {
        let state = memory_state();
        let p = catalog::create_product(&state, plush()).await.unwrap();
        let guest = add_item(&state, "guest-session", None, p.id, "std", 2).await.unwrap();
        let merged = merge(&state, "guest-session", "u2").await.unwrap();
        assert_eq!(merged.cart.id(), guest.cart.id());
        assert_eq!(merged.cart.user_id(), Some("u2"));
    }
}
