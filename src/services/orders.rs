//! Checkout, payment confirmation and order administration.

use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{cart, discounts, find_cart, update_order, AppState, Saved, MAX_ATTEMPTS};
use crate::domain::aggregates::{
    Address, AppliedDiscount, FulfillmentStatus, GatewayRef, NewOrder, Order, OrderStatus, PaymentMethod,
    PaymentStatus, TrackingUpdate, TrackingView,
};
use crate::domain::events::{OrderEvent, PaymentTransition};
use crate::domain::value_objects::{Email, OrderNumber};
use crate::notify::messages;
use crate::store::{OrderFilter, StoreError};
use crate::{Result, StorefrontError};

/// Generic miss message; never says which field was wrong.
pub const TRACKING_MISS: &str = "No order found for that number and email.";

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[validate(length(min = 1))]
    pub session_id: String,
    pub user_id: Option<String>,
    #[validate(email)]
    pub email: String,
    #[validate]
    pub shipping_address: Address,
    pub shipping_method: Option<String>,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub is_gift: bool,
    #[validate(length(max = 500))]
    pub gift_message: Option<String>,
    #[validate(length(max = 1000))]
    pub customer_notes: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStats {
    pub total_orders: usize,
    pub total_revenue: Decimal,
    pub total_profit: Decimal,
    pub pending_orders: usize,
}

fn tax_for(taxable: Decimal, rate: Decimal) -> Decimal {
    (taxable.max(Decimal::ZERO) * rate).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Builds an order from the live-priced cart. The cart is kept until payment succeeds.
pub async fn checkout(state: &AppState, request: CheckoutRequest) -> Result<Order> {
    request.validate()?;
    let email = Email::new(&request.email).map_err(|e| StorefrontError::validation(e.to_string()))?;
    let mut cart = find_cart(state, &request.session_id, request.user_id.as_deref()).await?
        .filter(|c| !c.is_empty())
        .ok_or_else(|| StorefrontError::validation("Cart is empty"))?;

    // the applied snapshot may be stale; re-check against the live subtotal
    let (lines, mut summary) = cart::price(state, &cart).await?;
    let mut discount_code = None;
    if let Some(applied) = cart.applied_discount().cloned() {
        let validated = discounts::check(state, applied.code.as_str(), Some(&email), summary.subtotal).await??;
        cart.apply_discount(AppliedDiscount { code: validated.code.clone(), kind: validated.kind, value: validated.value }, Utc::now());
        summary = cart.summary(&lines, &state.settings.shipping_policy());
        discount_code = Some(validated.code);
    }
    let tax = tax_for(summary.subtotal - summary.discount_amount, state.settings.tax_rate);

    for attempt in 1..=MAX_ATTEMPTS {
        let new = NewOrder {
            order_number: OrderNumber::generate(&state.settings.order_prefix, Utc::now()),
            email: email.clone(),
            user_id: request.user_id.clone(),
            cart_id: Some(cart.id()),
            lines: lines.clone(),
            currency: state.settings.currency.clone(),
            discount: summary.discount_amount,
            discount_code: discount_code.clone(),
            shipping: summary.shipping,
            tax,
            shipping_address: request.shipping_address.clone(),
            shipping_method: request.shipping_method.clone().unwrap_or_else(|| "standard".to_string()),
            payment_method: request.payment_method,
            is_gift: request.is_gift,
            gift_message: request.gift_message.clone().filter(|m| !m.trim().is_empty()),
            customer_notes: request.customer_notes.clone().filter(|m| !m.trim().is_empty()),
        };
        let mut order = Order::create(new, Utc::now())?;
        match state.store.insert_order(&mut order).await {
            Ok(()) => {
                tracing::info!(order_number = %order.order_number(), total = %order.total(), "order created");
                state.publisher.publish_all(order.take_events()).await;
                return Ok(order);
            }
            Err(StoreError::Duplicate(_)) if attempt < MAX_ATTEMPTS => {
                tracing::warn!(attempt, "order number collision, regenerating");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(StorefrontError::Conflict)
}

/// Applies a gateway report and, on the transition into paid, the post-payment effects.
///
/// Routing is left to the caller, gated on [`super::fulfillment::awaits_routing`].
pub async fn confirm_payment(state: &AppState, order_id: Uuid, status: PaymentStatus, gateway_ref: Option<GatewayRef>) -> Result<(Order, PaymentTransition)> {
    let Saved { order, value: transition, .. } = update_order(state, order_id, |order| {
        Ok(order.apply_payment(status, gateway_ref.clone(), Utc::now())?)
    }).await?;
    tracing::info!(order_number = %order.order_number(), payment_status = %order.payment_status(), ?transition, "payment status applied");

    if !transition.became(PaymentStatus::Paid) {
        return Ok((order, transition));
    }
    if order.status().is_terminal() {
        let order = flag_closed_payment(state, order).await;
        return Ok((order, transition));
    }
    let order = after_payment(state, order).await;
    Ok((order, transition))
}

/// Money arrived for an order that was already closed: no redemption, no confirmation, no routing.
async fn flag_closed_payment(state: &AppState, order: Order) -> Order {
    tracing::warn!(order_number = %order.order_number(), status = %order.status(), "payment received for a closed order; refund required");
    let note = format!("Payment received while order was {}; refund required", order.status());
    match update_order(state, order.id(), |o| Ok(o.add_internal_note(&note, Utc::now())?)).await {
        Ok(saved) => saved.order,
        Err(e) => {
            tracing::error!(order_number = %order.order_number(), error = %e, "failed to record refund note");
            order
        }
    }
}

/// Redeem the discount, drop the cart, confirm by email. Failures here are logged, never returned.
async fn after_payment(state: &AppState, mut order: Order) -> Order {
    if let Some(code) = order.discount_code().cloned() {
        let note = match state.store.redeem_discount(&code, order.email()).await {
            Ok(Ok(_)) => None,
            Ok(Err(rejection)) => {
                tracing::warn!(order_number = %order.order_number(), code = %code, %rejection, "discount redemption lost");
                Some(format!("Discount {code} was not redeemed: {rejection}"))
            }
            Err(e) => {
                tracing::error!(order_number = %order.order_number(), code = %code, error = %e, "discount redemption failed");
                Some(format!("Discount {code} redemption failed: {e}"))
            }
        };
        if let Some(note) = note {
            match update_order(state, order.id(), |o| Ok(o.add_internal_note(&note, Utc::now())?)).await {
                Ok(saved) => order = saved.order,
                Err(e) => tracing::error!(order_number = %order.order_number(), error = %e, "failed to record discount note"),
            }
        }
    }

    if let Some(cart_id) = order.cart_id() {
        if let Err(e) = state.store.delete_cart(cart_id).await {
            tracing::warn!(order_number = %order.order_number(), cart_id = %cart_id, error = %e, "failed to clear cart");
        }
    }

    let email = messages::order_confirmation(&order, &state.settings.app_url);
    if let Err(e) = state.send_email(&email).await {
        tracing::warn!(order_number = %order.order_number(), error = %e, "order confirmation email not sent");
    }
    order
}

/// Emails the customer once for the items a save just moved into shipped.
pub(crate) async fn notify_shipped(state: &AppState, order: &Order, events: &[OrderEvent]) {
    let shipped: Vec<usize> = events.iter().filter_map(|e| match e {
        OrderEvent::ItemShipped { item_index, .. } => Some(*item_index),
        _ => None,
    }).collect();
    let Some(email) = messages::shipping_update(order, &shipped) else { return };
    if let Err(e) = state.send_email(&email).await {
        tracing::warn!(order_number = %order.order_number(), error = %e, "shipping email not sent");
    }
}

pub async fn get(state: &AppState, id: Uuid) -> Result<Order> {
    state.load_order(id).await
}

pub async fn list(state: &AppState, filter: &OrderFilter) -> Result<Vec<Order>> {
    Ok(state.store.list_orders(filter).await?)
}

pub async fn set_status(state: &AppState, id: Uuid, status: OrderStatus) -> Result<Order> {
    let saved = update_order(state, id, |order| Ok(order.set_status(status, Utc::now())?)).await?;
    tracing::info!(order_number = %saved.order.order_number(), status = %status, "order status set");
    Ok(saved.order)
}

/// Admin per-item update; a move into shipped emails the customer.
pub async fn update_item(state: &AppState, id: Uuid, index: usize, status: FulfillmentStatus, update: TrackingUpdate) -> Result<Order> {
    let saved = update_order(state, id, |order| Ok(order.update_fulfillment(index, status, update.clone(), Utc::now())?)).await?;
    notify_shipped(state, &saved.order, &saved.events).await;
    Ok(saved.order)
}

pub async fn add_note(state: &AppState, id: Uuid, note: &str) -> Result<Order> {
    Ok(update_order(state, id, |order| Ok(order.add_internal_note(note, Utc::now())?)).await?.order)
}

/// Looks an order up by number and email; both must match.
pub async fn track(state: &AppState, order_number: &str, email: &str) -> Result<TrackingView> {
    let miss = || StorefrontError::not_found(TRACKING_MISS);
    let email = Email::new(email).map_err(|_| miss())?;
    let order = state.store.find_order_by_number(&OrderNumber::parse(order_number)).await?.ok_or_else(miss)?;
    if order.email() != &email { return Err(miss()); }
    Ok(order.tracking_view())
}

/// Revenue and profit count paid orders only.
pub async fn stats(state: &AppState) -> Result<OrderStats> {
    let orders = state.store.list_orders(&OrderFilter::default()).await?;
    let paid = || orders.iter().filter(|o| o.payment_status() == PaymentStatus::Paid);
    Ok(OrderStats {
        total_orders: orders.len(),
        total_revenue: paid().map(Order::total).sum(),
        total_profit: paid().map(Order::profit).sum(),
        pending_orders: orders.iter().filter(|o| matches!(o.status(), OrderStatus::Pending | OrderStatus::Paid)).count(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::aggregates::order::tests::address;
    use crate::domain::aggregates::product::tests::{new_product, variant};
    use crate::domain::aggregates::{DiscountKind, FulfillmentType};
    use crate::notify::{MockNotifier, OutboundEmail};
    use crate::services::discounts::tests::new_discount;
    use crate::services::tests::{memory_state, stored_order};
    use crate::services::{catalog, Integrations};
    use rust_decimal_macros::dec;
    use std::sync::{Arc, Mutex};

    pub(crate) fn checkout_request(session: &str) -> CheckoutRequest {
        CheckoutRequest {
            session_id: session.into(), user_id: None, email: "Mei@Example.com".into(), shipping_address: address(),
            shipping_method: None, payment_method: PaymentMethod::Stripe, is_gift: false, gift_message: None, customer_notes: None,
        }
    }

    /// A notifier that records every email it is asked to send.
    pub(crate) fn recording_notifier() -> (MockNotifier, Arc<Mutex<Vec<OutboundEmail>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink = sent.clone();
        let mut notifier = MockNotifier::new();
        notifier.expect_send().returning(move |email| {
            sink.lock().unwrap().push(email.clone());
            Ok(())
        });
        (notifier, sent)
    }

    async fn cart_with_plush(state: &AppState, session: &str) {
        let p = catalog::create_product(state, new_product("Plush Set", FulfillmentType::Manual, vec![variant("std", "DB-PLUSH-001", dec!(34.99), dec!(12))])).await.unwrap();
        cart::add_item(state, session, None, p.id, "std", 2).await.unwrap();
    }

    #[tokio::test]
    async fn test_checkout_freezes_discounted_totals() {
        let state = memory_state();
        cart_with_plush(&state, "s1").await;
        discounts::create(&state, new_discount("SAVE10", DiscountKind::Percentage, dec!(10))).await.unwrap();
        cart::apply_discount(&state, "s1", None, "SAVE10", None).await.unwrap();

        let order = checkout(&state, checkout_request("s1")).await.unwrap();
        assert_eq!(order.subtotal(), dec!(69.98));
        assert_eq!(order.discount(), dec!(6.998));
        assert_eq!(order.shipping(), Decimal::ZERO);
        assert_eq!(order.total(), dec!(62.982));
        assert_eq!(order.status(), OrderStatus::Pending);
        assert!(order.order_number().as_str().starts_with("DB-"));
        assert_eq!(order.email().as_str(), "mei@example.com");
        // cart survives until payment
        assert!(!cart::get(&state, "s1", None).await.unwrap().cart.is_empty());
    }

    #[tokio::test]
    async fn test_checkout_applies_tax_after_discount() {
        let mut state = memory_state();
        let mut settings = (*state.settings).clone();
        settings.tax_rate = dec!(0.08);
        state.settings = Arc::new(settings);
        cart_with_plush(&state, "s1").await;
        let order = checkout(&state, checkout_request("s1")).await.unwrap();
        assert_eq!(order.tax(), dec!(5.60));
        assert_eq!(order.total(), dec!(75.58));
    }

    #[tokio::test]
    async fn test_checkout_rejects_empty_cart_and_bad_input() {
        let state = memory_state();
        assert_eq!(checkout(&state, checkout_request("nobody")).await.unwrap_err().to_string(), "Cart is empty");
        let mut bad = checkout_request("nobody");
        bad.email = "not-an-email".into();
        assert!(matches!(checkout(&state, bad).await, Err(StorefrontError::Validation(_))));
    }

    #[tokio::test]
    async fn test_checkout_revalidates_applied_discount() {
        let state = memory_state();
        cart_with_plush(&state, "s1").await;
        discounts::create(&state, new_discount("ONCE", DiscountKind::Fixed, dec!(5))).await.unwrap();
        cart::apply_discount(&state, "s1", None, "ONCE", None).await.unwrap();
        discounts::deactivate(&state, "ONCE").await.unwrap();
        let err = checkout(&state, checkout_request("s1")).await.unwrap_err();
        assert_eq!(err.to_string(), "This discount code is no longer active");
    }

    #[tokio::test]
    async fn test_payment_confirmation_runs_effects_once() {
        let (notifier, sent) = recording_notifier();
        let state = memory_state().with_integrations(Integrations { notifier: Some(Arc::new(notifier)), ..Default::default() });
        cart_with_plush(&state, "s1").await;
        let mut limited = new_discount("SAVE10", DiscountKind::Percentage, dec!(10));
        limited.max_uses = Some(5);
        discounts::create(&state, limited).await.unwrap();
        cart::apply_discount(&state, "s1", None, "SAVE10", None).await.unwrap();
        let order = checkout(&state, checkout_request("s1")).await.unwrap();

        let (paid, t) = confirm_payment(&state, order.id(), PaymentStatus::Paid, Some(GatewayRef::StripeIntent("pi_1".into()))).await.unwrap();
        assert!(t.became(PaymentStatus::Paid));
        assert_eq!(paid.status(), OrderStatus::Paid);
        let (_, again) = confirm_payment(&state, order.id(), PaymentStatus::Paid, None).await.unwrap();
        assert_eq!(again, PaymentTransition::Unchanged);

        let code = crate::domain::value_objects::CouponCode::new("SAVE10").unwrap();
        assert_eq!(state.store.get_discount(&code).await.unwrap().unwrap().used_count, 1);
        assert!(cart::get(&state, "s1", None).await.unwrap().cart.is_empty());
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].subject.starts_with("Order Confirmed!"));
    }

    #[tokio::test]
    async fn test_checkout_rejects_unavailable_lines() {
        let state = memory_state();
        let p = catalog::create_product(&state, new_product("Plush", FulfillmentType::Manual, vec![variant("std", "DB-PLUSH-001", dec!(34.99), dec!(12))])).await.unwrap();
        cart::add_item(&state, "s1", None, p.id, "std", 1).await.unwrap();
        catalog::deactivate_product(&state, p.id).await.unwrap();
        assert!(matches!(checkout(&state, checkout_request("s1")).await, Err(StorefrontError::Validation(_))));
    }

    #[tokio::test]
    async fn test_payment_on_cancelled_order_skips_effects() {
        let (notifier, sent) = recording_notifier();
        let state = memory_state().with_integrations(Integrations { notifier: Some(Arc::new(notifier)), ..Default::default() });
        cart_with_plush(&state, "s1").await;
        discounts::create(&state, new_discount("SAVE10", DiscountKind::Percentage, dec!(10))).await.unwrap();
        cart::apply_discount(&state, "s1", None, "SAVE10", None).await.unwrap();
        let order = checkout(&state, checkout_request("s1")).await.unwrap();
        set_status(&state, order.id(), OrderStatus::Cancelled).await.unwrap();

        let (paid, t) = confirm_payment(&state, order.id(), PaymentStatus::Paid, None).await.unwrap();
        assert!(t.became(PaymentStatus::Paid));
        assert_eq!(paid.status(), OrderStatus::Cancelled);
        assert!(paid.internal_notes().unwrap().ends_with("Payment received while order was cancelled; refund required"));

        let code = crate::domain::value_objects::CouponCode::new("SAVE10").unwrap();
        assert_eq!(state.store.get_discount(&code).await.unwrap().unwrap().used_count, 0);
        assert!(!cart::get(&state, "s1", None).await.unwrap().cart.is_empty());
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lost_redemption_race_is_noted_not_fatal() {
        let state = memory_state();
        cart_with_plush(&state, "s1").await;
        let mut single = new_discount("LAST1", DiscountKind::Fixed, dec!(5));
        single.max_uses = Some(1);
        discounts::create(&state, single).await.unwrap();
        cart::apply_discount(&state, "s1", None, "LAST1", None).await.unwrap();
        let order = checkout(&state, checkout_request("s1")).await.unwrap();
        // someone else used the last redemption meanwhile
        let code = crate::domain::value_objects::CouponCode::new("LAST1").unwrap();
        state.store.redeem_discount(&code, &Email::new("other@example.com").unwrap()).await.unwrap().unwrap();

        let (paid, _) = confirm_payment(&state, order.id(), PaymentStatus::Paid, None).await.unwrap();
        assert_eq!(paid.payment_status(), PaymentStatus::Paid);
        assert!(paid.internal_notes().unwrap().contains("LAST1 was not redeemed"));
    }

    #[tokio::test]
    async fn test_shipping_email_sent_once_per_transition() {
        let (notifier, sent) = recording_notifier();
        let state = memory_state().with_integrations(Integrations { notifier: Some(Arc::new(notifier)), ..Default::default() });
        let order = stored_order(&state, &[FulfillmentType::Manual]).await;
        confirm_payment(&state, order.id(), PaymentStatus::Paid, None).await.unwrap();
        sent.lock().unwrap().clear();

        let update = TrackingUpdate { tracking_number: Some("1Z".into()), ..Default::default() };
        update_item(&state, order.id(), 0, FulfillmentStatus::Shipped, update.clone()).await.unwrap();
        let o = update_item(&state, order.id(), 0, FulfillmentStatus::Shipped, update).await.unwrap();
        assert_eq!(o.status(), OrderStatus::Shipped);
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_track_requires_matching_email() {
        let state = memory_state();
        let order = stored_order(&state, &[FulfillmentType::Manual]).await;
        let number = order.order_number().as_str().to_lowercase();
        let view = track(&state, &number, "MEI@example.com").await.unwrap();
        assert_eq!(view.order_number, order.order_number().as_str());

        let wrong_email = track(&state, &number, "someone@example.com").await.unwrap_err();
        let wrong_number = track(&state, "DB-NOPE-0000", "mei@example.com").await.unwrap_err();
        assert_eq!(wrong_email.to_string(), TRACKING_MISS);
        assert_eq!(wrong_number.to_string(), TRACKING_MISS);
    }

    #[tokio::test]
    async fn test_stats_count_paid_orders_only() {
        let state = memory_state();
        let paid = stored_order(&state, &[FulfillmentType::Manual]).await;
        stored_order(&state, &[FulfillmentType::Manual, FulfillmentType::Manual]).await;
        confirm_payment(&state, paid.id(), PaymentStatus::Paid, None).await.unwrap();

        let s = stats(&state).await.unwrap();
        assert_eq!(s.total_orders, 2);
        assert_eq!(s.total_revenue, dec!(20));
        assert_eq!(s.total_profit, dec!(12));
        assert_eq!(s.pending_orders, 2);
    }

    #[tokio::test]
    async fn test_admin_status_and_notes() {
        let state = memory_state();
        let order = stored_order(&state, &[FulfillmentType::Manual]).await;
        let cancelled = set_status(&state, order.id(), OrderStatus::Cancelled).await.unwrap();
        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        assert!(matches!(set_status(&state, order.id(), OrderStatus::Processing).await, Err(StorefrontError::Validation(_))));
        let noted = add_note(&state, order.id(), "customer called").await.unwrap();
        assert!(noted.internal_notes().unwrap().ends_with("customer called"));
    }
}
