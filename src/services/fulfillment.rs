//! Fulfillment routing.
//!
//! A paid order's items are split by fulfillment type. Each group is handled
//! on its own so one vendor's outage never blocks the others, and the order
//! always moves on to `processing` afterwards.

use chrono::Utc;
use rust_decimal::RoundingStrategy;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use super::orders::notify_shipped;
use super::{update_order, AppState};
use crate::domain::aggregates::{FulfillmentStatus, FulfillmentType, Order, OrderStatus, PaymentStatus, Product, TrackingUpdate};
use crate::notify::messages;
use crate::vendors::{GiftNote, PackingSlip, Recipient, VendorError, VendorLineItem, VendorOrderRequest};
use crate::{Result, StorefrontError};

pub const PACKING_SLIP_MESSAGE: &str = "Thank you for your order!";

/// Per-group outcome: `{printful:{success,orderId,error}, dropship:{success,notified}, manual:{count}}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentSummary {
    pub printful: PrintfulOutcome,
    pub dropship: DropshipOutcome,
    pub manual: ManualOutcome,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintfulOutcome {
    pub success: bool,
    pub order_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DropshipOutcome {
    pub success: bool,
    pub notified: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ManualOutcome {
    pub count: usize,
}

/// Item writes decided while talking to vendors, applied in one save.
#[derive(Default)]
struct Plan {
    moves: Vec<(usize, FulfillmentStatus, TrackingUpdate)>,
    printful_order_id: Option<String>,
}

impl Plan {
    fn mark(&mut self, indices: &[usize], status: FulfillmentStatus, fulfillment_order_id: Option<&str>) {
        for &i in indices {
            let update = TrackingUpdate { fulfillment_order_id: fulfillment_order_id.map(str::to_string), ..Default::default() };
            self.moves.push((i, status, update));
        }
    }
}

/// Paid, and routing has not moved it on yet.
pub fn awaits_routing(order: &Order) -> bool {
    order.payment_status() == PaymentStatus::Paid && order.status() == OrderStatus::Paid
}

/// Dispatches every pending or failed item of a paid order.
pub async fn process_order(state: &AppState, order_id: Uuid) -> Result<FulfillmentSummary> {
    let order = state.load_order(order_id).await?;
    if order.payment_status() != PaymentStatus::Paid {
        return Err(StorefrontError::validation("Order has not been paid"));
    }
    if order.status().is_terminal() {
        return Err(StorefrontError::validation(format!("Order is {}", order.status())));
    }

    let group = |t: FulfillmentType| -> Vec<usize> {
        order.item_indices(t).into_iter().filter(|&i| order.items()[i].fulfillment_status.is_dispatchable()).collect()
    };
    let (printful, dropship, manual) = (group(FulfillmentType::Printful), group(FulfillmentType::Dropship), group(FulfillmentType::Manual));

    let mut summary = FulfillmentSummary::default();
    let mut plan = Plan::default();

    if !printful.is_empty() {
        summary.printful = submit_printful(state, &order, &printful, &mut plan).await;
    }

    if !dropship.is_empty() {
        summary.dropship = notify_dropship(state, &order, &dropship, &mut plan).await;
    }

    if !manual.is_empty() {
        tracing::info!(order_number = %order.order_number(), count = manual.len(), "manual items awaiting handling");
        plan.mark(&manual, FulfillmentStatus::Submitted, None);
        summary.manual.count = manual.len();
    }

    let Plan { moves, printful_order_id } = plan;
    let saved = update_order(state, order_id, |order| {
        let now = Utc::now();
        for (index, status, update) in &moves {
            // a webhook may have moved the item on since we read it
            let current = order.items()[*index].fulfillment_status;
            if current.is_dispatchable() && current.can_become(*status) {
                order.update_fulfillment(*index, *status, update.clone(), now)?;
            }
        }
        if let Some(id) = &printful_order_id { order.set_printful_order_id(id, now); }
        order.mark_processing(now);
        Ok(())
    }).await?;

    tracing::info!(order_number = %saved.order.order_number(), status = %saved.order.status(), ?summary, "fulfillment routed");
    Ok(summary)
}

async fn submit_printful(state: &AppState, order: &Order, indices: &[usize], plan: &mut Plan) -> PrintfulOutcome {
    let result = match &state.integrations.printful {
        Some(client) => match printful_request(state, order, indices).await {
            Ok(request) => client.create_order(&request).await,
            Err(e) => Err(e),
        },
        None => Err(VendorError::NotConfigured),
    };

    match result {
        Ok(vendor_order) => {
            tracing::info!(order_number = %order.order_number(), vendor = "printful", vendor_order_id = %vendor_order.id, "vendor order created");
            plan.mark(indices, FulfillmentStatus::Submitted, Some(vendor_order.id.as_str()));
            plan.printful_order_id = Some(vendor_order.id.clone());
            PrintfulOutcome { success: true, order_id: Some(vendor_order.id), error: None }
        }
        Err(e) if e.is_definitive() => {
            tracing::error!(order_number = %order.order_number(), vendor = "printful", error = %e, "vendor rejected order");
            plan.mark(indices, FulfillmentStatus::Failed, None);
            PrintfulOutcome { success: false, order_id: None, error: Some(e.to_string()) }
        }
        Err(e) => {
            // ambiguous: the vendor may have the order, so items stay pending
            tracing::warn!(order_number = %order.order_number(), vendor = "printful", error = %e, "vendor call did not complete");
            PrintfulOutcome { success: false, order_id: None, error: Some(e.to_string()) }
        }
    }
}

async fn printful_request(state: &AppState, order: &Order, indices: &[usize]) -> std::result::Result<VendorOrderRequest, VendorError> {
    let ids: Vec<Uuid> = indices.iter().map(|&i| order.items()[i].product_id).collect();
    let products: HashMap<Uuid, Product> = state.store.get_products(&ids).await
        .map_err(|e| VendorError::Transport(e.to_string()))?
        .into_iter().map(|p| (p.id, p)).collect();

    let mut items = Vec::with_capacity(indices.len());
    for &i in indices {
        let item = &order.items()[i];
        let variant_id = products.get(&item.product_id)
            .and_then(|p| p.printful_variant_id(&item.variant_id))
            .or_else(|| item.sku.printful_variant_id())
            .ok_or_else(|| VendorError::Rejected { status: 0, message: format!("No Printful variant for SKU {}", item.sku) })?;
        items.push(VendorLineItem {
            sync_variant_id: variant_id,
            quantity: item.quantity,
            retail_price: format!("{:.2}", item.unit_price.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)),
            name: format!("{} - {}", item.product_name, item.variant_name),
        });
    }

    let a = order.shipping_address();
    Ok(VendorOrderRequest {
        external_id: order.order_number().to_string(),
        recipient: Recipient {
            name: a.full_name(), address1: a.address1.clone(), address2: a.address2.clone(), city: a.city.clone(),
            state_code: a.state.clone(), country_code: a.country.clone(), zip: a.postal_code.clone(),
            phone: a.phone.clone(), email: order.email().to_string(),
        },
        items,
        gift: order.is_gift().then(|| order.gift_message()).flatten().map(|m| GiftNote { message: m.to_string() }),
        packing_slip: PackingSlip { email: order.email().to_string(), message: PACKING_SLIP_MESSAGE.to_string() },
    })
}

async fn notify_dropship(state: &AppState, order: &Order, indices: &[usize], plan: &mut Plan) -> DropshipOutcome {
    let Some(admin) = state.integrations.admin_email.as_deref() else {
        tracing::warn!(order_number = %order.order_number(), "no admin email configured; dropship items stay pending");
        return DropshipOutcome::default();
    };
    let email = messages::dropship_alert(order, indices, admin);
    match state.send_email(&email).await {
        Ok(()) => {
            tracing::info!(order_number = %order.order_number(), count = indices.len(), "dropship notification sent");
            plan.mark(indices, FulfillmentStatus::Submitted, None);
            DropshipOutcome { success: true, notified: true }
        }
        Err(e) => {
            tracing::error!(order_number = %order.order_number(), error = %e, "dropship notification failed; items stay pending");
            DropshipOutcome::default()
        }
    }
}

/// Pulls shipments for the order's vendor order and applies the latest one.
pub async fn sync_tracking(state: &AppState, order_id: Uuid) -> Result<Order> {
    let order = state.load_order(order_id).await?;
    let vendor_order_id = order.printful_order_id()
        .ok_or_else(|| StorefrontError::validation("Order has no Printful order"))?
        .to_string();
    let client = state.integrations.printful.as_ref().ok_or(VendorError::NotConfigured)?;
    let status = client.get_order(&vendor_order_id).await.map_err(|e| {
        tracing::error!(order_number = %order.order_number(), vendor = "printful", error = %e, "tracking sync failed");
        e
    })?;

    let Some(shipment) = status.shipments.last() else {
        return Ok(order);
    };
    let update = TrackingUpdate {
        fulfillment_order_id: None,
        tracking_number: Some(shipment.tracking_number.clone()),
        tracking_url: Some(shipment.tracking_url.clone()),
    };
    let saved = update_order(state, order_id, |order| {
        for i in order.item_indices(FulfillmentType::Printful) {
            if order.items()[i].fulfillment_status.can_become(FulfillmentStatus::Shipped) {
                order.update_fulfillment(i, FulfillmentStatus::Shipped, update.clone(), Utc::now())?;
            }
        }
        Ok(())
    }).await?;
    notify_shipped(state, &saved.order, &saved.events).await;
    Ok(saved.order)
}
