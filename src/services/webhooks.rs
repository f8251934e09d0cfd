//! Inbound payment and vendor webhooks.
//!
//! Every delivery is verified, then appended to the webhook log before any
//! state changes. A delivery whose fingerprint was already processed is
//! acknowledged and skipped; handler failures are recorded on the log entry
//! and left for [`replay_pending`].

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::orders::{confirm_payment, notify_shipped};
use super::{fulfillment, update_order, AppState};
use crate::domain::aggregates::{FulfillmentStatus, FulfillmentType, GatewayRef, Order, PaymentStatus, TrackingUpdate};
use crate::domain::value_objects::OrderNumber;
use crate::signature::{self, SignatureError};
use crate::store::WebhookEvent;
use crate::{Result, StorefrontError};

pub const STRIPE: &str = "stripe";
pub const PRINTFUL: &str = "printful";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub duplicate: bool,
}

#[derive(Debug, Deserialize)]
struct StripeEvent {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    data: StripeData,
}

#[derive(Debug, Deserialize)]
struct StripeData {
    object: StripeObject,
}

#[derive(Debug, Deserialize)]
struct StripeObject {
    id: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    payment_intent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PrintfulEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: PrintfulData,
}

#[derive(Debug, Default, Deserialize)]
struct PrintfulData {
    order: Option<PrintfulOrderRef>,
    shipment: Option<PrintfulShipment>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PrintfulOrderRef {
    #[serde(default)]
    id: Option<serde_json::Value>,
    external_id: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PrintfulShipment {
    tracking_number: Option<String>,
    tracking_url: Option<String>,
}

impl PrintfulEvent {
    /// The vendor's own order id; sent as a number, kept as text.
    fn vendor_order_id(&self) -> Option<String> {
        match self.data.order.as_ref()?.id.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

fn malformed(e: serde_json::Error) -> StorefrontError {
    StorefrontError::validation(format!("Malformed webhook payload: {e}"))
}

/// Appends the delivery; `true` when it was already handled.
async fn record(state: &AppState, provider: &str, fingerprint: &str, event_type: &str, vendor_order_id: Option<String>, payload: &serde_json::Value) -> Result<bool> {
    let event = WebhookEvent::new(provider, fingerprint.to_string(), event_type, payload.clone(), Utc::now())
        .with_vendor_order_id(vendor_order_id);
    let processed = state.store.log_webhook_event(&event).await?;
    if processed {
        tracing::info!(provider, fingerprint, event_type, "duplicate webhook acknowledged");
    }
    Ok(processed)
}

async fn settle(state: &AppState, provider: &str, fingerprint: &str, outcome: Result<()>) -> Result<()> {
    let error = outcome.err().map(|e| {
        tracing::error!(provider, fingerprint, error = %e, "webhook handling failed");
        e.to_string()
    });
    state.store.mark_webhook_event(provider, fingerprint, error, Utc::now()).await?;
    Ok(())
}

pub async fn handle_stripe(state: &AppState, signature_header: Option<&str>, body: &[u8]) -> Result<WebhookAck> {
    let secret = state.integrations.stripe_webhook_secret.as_deref().ok_or(SignatureError::NotConfigured)?;
    signature::verify_stripe(secret, signature_header, body, Utc::now().timestamp()).map_err(|e| {
        tracing::warn!(provider = STRIPE, error = %e, "webhook signature rejected");
        e
    })?;
    let payload: serde_json::Value = serde_json::from_slice(body).map_err(malformed)?;
    let event: StripeEvent = serde_json::from_value(payload.clone()).map_err(malformed)?;

    if record(state, STRIPE, &event.id, &event.kind, Some(event.data.object.id.clone()), &payload).await? {
        return Ok(WebhookAck { received: true, duplicate: true });
    }
    let outcome = dispatch_stripe(state, &event).await;
    settle(state, STRIPE, &event.id, outcome).await?;
    Ok(WebhookAck { received: true, duplicate: false })
}

async fn stripe_order(state: &AppState, object: &StripeObject) -> Result<Option<Order>> {
    if let Some(id) = object.metadata.get("orderId").and_then(|id| Uuid::parse_str(id).ok()) {
        if let Some(order) = state.store.get_order(id).await? { return Ok(Some(order)); }
    }
    Ok(state.store.find_order_by_payment_ref(&object.id).await?)
}

async fn dispatch_stripe(state: &AppState, event: &StripeEvent) -> Result<()> {
    let object = &event.data.object;
    match event.kind.as_str() {
        "payment_intent.succeeded" | "payment_intent.payment_failed" => {
            let Some(order) = stripe_order(state, object).await? else {
                tracing::warn!(event_id = %event.id, intent = %object.id, "no order for payment intent");
                return Ok(());
            };
            let status = if event.kind == "payment_intent.succeeded" { PaymentStatus::Paid } else { PaymentStatus::Failed };
            let (order, _) = confirm_payment(state, order.id(), status, Some(GatewayRef::StripeIntent(object.id.clone()))).await?;
            // also picks up a paid order whose earlier routing attempt failed
            if fulfillment::awaits_routing(&order) {
                let summary = fulfillment::process_order(state, order.id()).await?;
                tracing::info!(order_number = %order.order_number(), ?summary, "paid order routed");
            }
            Ok(())
        }
        "charge.refunded" => {
            let intent = object.payment_intent.as_deref().unwrap_or(&object.id);
            let Some(order) = state.store.find_order_by_payment_ref(intent).await? else {
                tracing::warn!(event_id = %event.id, intent, "no order for refunded charge");
                return Ok(());
            };
            confirm_payment(state, order.id(), PaymentStatus::Refunded, None).await?;
            Ok(())
        }
        other => {
            tracing::info!(event_type = other, "unhandled stripe event");
            Ok(())
        }
    }
}

/// Deduplicated on a digest of the body, since vendor deliveries carry no event id.
pub async fn handle_printful(state: &AppState, signature_header: Option<&str>, body: &[u8]) -> Result<WebhookAck> {
    let secret = state.integrations.printful_webhook_secret.as_deref().ok_or(SignatureError::NotConfigured)?;
    signature::verify_printful(secret, signature_header, body).map_err(|e| {
        tracing::warn!(provider = PRINTFUL, error = %e, "webhook signature rejected");
        e
    })?;
    let payload: serde_json::Value = serde_json::from_slice(body).map_err(malformed)?;
    let event: PrintfulEvent = serde_json::from_value(payload.clone()).map_err(malformed)?;
    let fingerprint = signature::fingerprint(body);
    tracing::info!(provider = PRINTFUL, event_type = %event.kind, "webhook received");

    if record(state, PRINTFUL, &fingerprint, &event.kind, event.vendor_order_id(), &payload).await? {
        return Ok(WebhookAck { received: true, duplicate: true });
    }
    let outcome = dispatch_printful(state, &event).await;
    settle(state, PRINTFUL, &fingerprint, outcome).await?;
    Ok(WebhookAck { received: true, duplicate: false })
}

async fn printful_order(state: &AppState, event: &PrintfulEvent) -> Result<Option<Order>> {
    let Some(external_id) = event.data.order.as_ref().and_then(|o| o.external_id.as_deref()) else {
        return Ok(None);
    };
    let order = state.store.find_order_by_number(&OrderNumber::parse(external_id)).await?;
    if order.is_none() {
        tracing::warn!(external_id, event_type = %event.kind, "vendor webhook for unknown order");
    }
    Ok(order)
}

/// Moves every print-on-demand item that may take `status`; the set is idempotent.
async fn set_printful_items(state: &AppState, order_id: Uuid, status: FulfillmentStatus, update: TrackingUpdate, note: Option<String>) -> Result<()> {
    let saved = update_order(state, order_id, |order| {
        let now = Utc::now();
        for i in order.item_indices(FulfillmentType::Printful) {
            if order.items()[i].fulfillment_status.can_become(status) {
                order.update_fulfillment(i, status, update.clone(), now)?;
            }
        }
        if let Some(note) = &note { order.add_internal_note(note, now)?; }
        Ok(())
    }).await?;
    tracing::info!(order_number = %saved.order.order_number(), item_status = %status, order_status = %saved.order.status(), "vendor update applied");
    notify_shipped(state, &saved.order, &saved.events).await;
    Ok(())
}

async fn dispatch_printful(state: &AppState, event: &PrintfulEvent) -> Result<()> {
    match event.kind.as_str() {
        "package_shipped" => {
            let Some(order) = printful_order(state, event).await? else { return Ok(()) };
            let shipment = event.data.shipment.as_ref();
            let update = TrackingUpdate {
                fulfillment_order_id: None,
                tracking_number: shipment.and_then(|s| s.tracking_number.clone()),
                tracking_url: shipment.and_then(|s| s.tracking_url.clone()),
            };
            set_printful_items(state, order.id(), FulfillmentStatus::Shipped, update, None).await
        }
        "order_updated" => {
            let fulfilled = event.data.order.as_ref().and_then(|o| o.status.as_deref()) == Some("fulfilled");
            if !fulfilled { return Ok(()); }
            let Some(order) = printful_order(state, event).await? else { return Ok(()) };
            set_printful_items(state, order.id(), FulfillmentStatus::Delivered, TrackingUpdate::default(), None).await
        }
        "order_canceled" | "order_failed" => {
            let Some(order) = printful_order(state, event).await? else { return Ok(()) };
            let reason = event.data.reason.as_deref().filter(|r| !r.trim().is_empty()).unwrap_or("No reason provided");
            let note = format!("Printful {}: {}", event.kind, reason);
            set_printful_items(state, order.id(), FulfillmentStatus::Failed, TrackingUpdate::default(), Some(note)).await
        }
        "order_created" | "product_synced" | "product_updated" | "product_deleted" => {
            tracing::info!(event_type = %event.kind, "vendor event logged");
            Ok(())
        }
        other => {
            tracing::info!(event_type = other, "unhandled vendor event");
            Ok(())
        }
    }
}

/// Re-runs logged deliveries that never finished. Returns how many now succeeded.
pub async fn replay_pending(state: &AppState, provider: &str) -> Result<usize> {
    if provider != STRIPE && provider != PRINTFUL {
        return Err(StorefrontError::not_found(format!("Unknown webhook provider {provider}")));
    }
    let pending = state.store.unprocessed_webhook_events(provider).await?;
    let mut replayed = 0;
    for event in pending {
        let outcome = match provider {
            STRIPE => match serde_json::from_value::<StripeEvent>(event.payload.clone()) {
                Ok(e) => dispatch_stripe(state, &e).await,
                Err(e) => Err(malformed(e)),
            },
            PRINTFUL => match serde_json::from_value::<PrintfulEvent>(event.payload.clone()) {
                Ok(e) => dispatch_printful(state, &e).await,
                Err(e) => Err(malformed(e)),
            },
            _ => continue,
        };
        if outcome.is_ok() { replayed += 1; }
        settle(state, provider, &event.fingerprint, outcome).await?;
    }
    tracing::info!(provider, replayed, "webhook replay finished");
    Ok(replayed)
}
