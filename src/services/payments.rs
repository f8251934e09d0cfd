//! Payment handoff: sessions sized to the order total, and server-side capture.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::{fulfillment, orders, update_order, AppState};
use crate::domain::aggregates::{GatewayRef, Order, PaymentMethod, PaymentStatus};
use crate::payments::{to_minor_units, GatewayError, PaymentGateway, PaymentRequest, PaymentSession};
use crate::{Result, StorefrontError};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOutcome {
    pub success: bool,
    pub capture_id: String,
    pub status: String,
    pub order: Order,
}

fn gateway(state: &AppState, method: PaymentMethod) -> Result<Arc<dyn PaymentGateway>> {
    let configured = match method {
        PaymentMethod::Stripe => state.integrations.stripe.clone(),
        PaymentMethod::Paypal => state.integrations.paypal.clone(),
    };
    configured.ok_or_else(|| GatewayError::NotConfigured.into())
}

/// Opens a gateway session for the order's frozen total.
///
/// A client-supplied amount must agree with the order to the cent.
pub async fn create_session(state: &AppState, method: PaymentMethod, order_id: Uuid, amount: Option<Decimal>, currency: Option<&str>) -> Result<PaymentSession> {
    let gateway = gateway(state, method)?;
    let order = state.load_order(order_id).await?;
    if let Some(amount) = amount {
        if to_minor_units(amount)? != to_minor_units(order.total())? {
            return Err(StorefrontError::validation("Amount does not match order total"));
        }
    }
    if let Some(currency) = currency {
        if !currency.eq_ignore_ascii_case(order.currency()) {
            return Err(StorefrontError::validation("Currency does not match order"));
        }
    }
    if order.payment_status() == PaymentStatus::Paid {
        return Err(StorefrontError::validation("Order is already paid"));
    }

    let request = PaymentRequest {
        amount: order.total(),
        currency: order.currency().to_string(),
        order_id,
        order_number: order.order_number().to_string(),
    };
    let session = gateway.create_session(&request).await.map_err(|e| {
        tracing::error!(order_number = %order.order_number(), method = ?method, error = %e, "payment session failed");
        e
    })?;

    let gateway_ref = match method {
        PaymentMethod::Stripe => GatewayRef::StripeIntent(session.transaction_id.clone()),
        PaymentMethod::Paypal => GatewayRef::PaypalOrder(session.transaction_id.clone()),
    };
    update_order(state, order_id, |o| Ok(o.attach_payment_ref(gateway_ref.clone(), Utc::now())?)).await?;
    tracing::info!(order_number = %order.order_number(), method = ?gateway.method(), transaction_id = %session.transaction_id, "payment session opened");
    Ok(session)
}

/// Captures an approved wallet order, then marks the order paid and routes it.
pub async fn capture_paypal(state: &AppState, paypal_order_id: &str, order_id: Uuid) -> Result<CaptureOutcome> {
    let gateway = gateway(state, PaymentMethod::Paypal)?;
    let order = state.load_order(order_id).await?;
    if order.paypal_order_id().is_some_and(|id| id != paypal_order_id) {
        return Err(StorefrontError::validation("PayPal order does not belong to this order"));
    }

    let capture = gateway.capture(paypal_order_id).await.map_err(|e| {
        tracing::error!(order_number = %order.order_number(), error = %e, "paypal capture failed");
        e
    })?;
    if !capture.completed {
        tracing::warn!(order_number = %order.order_number(), status = %capture.status, "paypal capture not completed");
        return Err(StorefrontError::validation("Payment not completed"));
    }

    let (order, _) = orders::confirm_payment(state, order_id, PaymentStatus::Paid, Some(GatewayRef::PaypalOrder(paypal_order_id.to_string()))).await?;
    let order = if fulfillment::awaits_routing(&order) {
        if let Err(e) = fulfillment::process_order(state, order_id).await {
            tracing::error!(order_number = %order.order_number(), error = %e, "fulfillment after capture failed");
        }
        state.load_order(order_id).await?
    } else {
        order
    };
    Ok(CaptureOutcome { success: true, capture_id: capture.transaction_id, status: capture.status, order })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{FulfillmentType, OrderStatus};
    use crate::payments::{CaptureResult, MockPaymentGateway};
    use crate::services::tests::{memory_state, stored_order};
    use crate::services::Integrations;
    use rust_decimal_macros::dec;

    fn stripe_mock() -> MockPaymentGateway {
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_method().return_const(PaymentMethod::Stripe);
        gateway.expect_create_session().returning(|request| {
            assert_eq!(request.amount, dec!(20));
            Ok(PaymentSession { client_secret: Some("pi_9_secret".into()), approval_id: None, transaction_id: "pi_9".into() })
        });
        gateway
    }

    #[tokio::test]
    async fn test_session_records_intent_on_order() {
        let state = memory_state().with_integrations(Integrations { stripe: Some(Arc::new(stripe_mock())), ..Default::default() });
        let order = stored_order(&state, &[FulfillmentType::Manual]).await;
        let session = create_session(&state, PaymentMethod::Stripe, order.id(), Some(dec!(20.00)), Some("usd")).await.unwrap();
        assert_eq!(session.transaction_id, "pi_9");
        let found = state.store.find_order_by_payment_ref("pi_9").await.unwrap().unwrap();
        assert_eq!(found.id(), order.id());
    }

    #[tokio::test]
    async fn test_session_rejects_mismatched_amount_and_missing_gateway() {
        let state = memory_state().with_integrations(Integrations { stripe: Some(Arc::new(stripe_mock())), ..Default::default() });
        let order = stored_order(&state, &[FulfillmentType::Manual]).await;
        let err = create_session(&state, PaymentMethod::Stripe, order.id(), Some(dec!(1)), None).await.unwrap_err();
        assert_eq!(err.to_string(), "Amount does not match order total");
        assert!(matches!(create_session(&state, PaymentMethod::Paypal, order.id(), None, None).await, Err(StorefrontError::Vendor(_))));
    }

    #[tokio::test]
    async fn test_capture_marks_paid_and_routes() {
        let mut paypal = MockPaymentGateway::new();
        paypal.expect_capture().times(1).returning(|id| Ok(CaptureResult { transaction_id: format!("cap-{id}"), status: "COMPLETED".into(), completed: true }));
        let state = memory_state().with_integrations(Integrations { paypal: Some(Arc::new(paypal)), ..Default::default() });
        let order = stored_order(&state, &[FulfillmentType::Manual]).await;

        let outcome = capture_paypal(&state, "5O190127", order.id()).await.unwrap();
        assert_eq!(outcome.capture_id, "cap-5O190127");
        assert_eq!(outcome.order.payment_status(), PaymentStatus::Paid);
        assert_eq!(outcome.order.status(), OrderStatus::Processing);
        assert_eq!(outcome.order.paypal_order_id(), Some("5O190127"));
    }

    #[tokio::test]
    async fn test_incomplete_capture_is_rejected() {
        let mut paypal = MockPaymentGateway::new();
        paypal.expect_capture().returning(|id| Ok(CaptureResult { transaction_id: id.to_string(), status: "PENDING".into(), completed: false }));
        let state = memory_state().with_integrations(Integrations { paypal: Some(Arc::new(paypal)), ..Default::default() });
        let order = stored_order(&state, &[FulfillmentType::Manual]).await;
        let err = capture_paypal(&state, "5O1", order.id()).await.unwrap_err();
        assert_eq!(err.to_string(), "Payment not completed");
        assert_eq!(state.load_order(order.id()).await.unwrap().payment_status(), PaymentStatus::Pending);
    }
}
