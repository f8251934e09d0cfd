//! Order Aggregate
//!
//! An order is created once from a priced cart snapshot. Prices and costs are
//! frozen at creation; afterwards only payment state, per-item fulfillment
//! state, notes and the derived overall status change.

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use super::cart::PricedLine;
use super::product::FulfillmentType;
use crate::domain::events::{OrderEvent, PaymentTransition};
use crate::domain::value_objects::{CouponCode, Email, OrderNumber, Sku};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: Uuid,
    order_number: OrderNumber,
    email: Email,
    user_id: Option<String>,
    cart_id: Option<Uuid>,
    status: OrderStatus,
    payment_status: PaymentStatus,
    payment_method: PaymentMethod,
    payment_intent_id: Option<String>,
    paypal_order_id: Option<String>,
    items: Vec<OrderItem>,
    currency: String,
    subtotal: Decimal,
    discount: Decimal,
    discount_code: Option<CouponCode>,
    shipping: Decimal,
    tax: Decimal,
    total: Decimal,
    profit: Decimal,
    shipping_address: Address,
    shipping_method: String,
    is_gift: bool,
    gift_message: Option<String>,
    customer_notes: Option<String>,
    internal_notes: Option<String>,
    printful_order_id: Option<String>,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<OrderEvent>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: Uuid,
    pub variant_id: String,
    pub sku: Sku,
    pub product_name: String,
    pub variant_name: String,
    pub image: Option<String>,
    pub unit_price: Decimal,
    pub unit_cost: Decimal,
    pub quantity: u32,
    pub fulfillment_type: FulfillmentType,
    pub fulfillment_status: FulfillmentStatus,
    pub fulfillment_order_id: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[validate(length(min = 1))]
    pub first_name: String,
    #[validate(length(min = 1))]
    pub last_name: String,
    pub company: Option<String>,
    #[validate(length(min = 1))]
    pub address1: String,
    pub address2: Option<String>,
    #[validate(length(min = 1))]
    pub city: String,
    pub state: String,
    #[validate(length(min = 1))]
    pub postal_code: String,
    #[validate(length(equal = 2))]
    pub country: String,
    pub phone: String,
}

impl Address {
    pub fn full_name(&self) -> String { format!("{} {}", self.first_name, self.last_name) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus { #[default] Pending, Paid, Processing, PartiallyShipped, Shipped, Delivered, Cancelled, Refunded }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus { #[default] Pending, Paid, Failed, Refunded }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus { #[default] Pending, Submitted, InProduction, Shipped, Delivered, Failed }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod { Stripe, Paypal }

/// Reference handed back by a payment gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayRef { StripeIntent(String), PaypalOrder(String) }

/// Optional fields patched alongside a fulfillment status; `None` keeps the old value.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingUpdate {
    pub fulfillment_order_id: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
}

pub struct NewOrder {
    pub order_number: OrderNumber,
    pub email: Email,
    pub user_id: Option<String>,
    pub cart_id: Option<Uuid>,
    pub lines: Vec<PricedLine>,
    pub currency: String,
    pub discount: Decimal,
    pub discount_code: Option<CouponCode>,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub shipping_address: Address,
    pub shipping_method: String,
    pub payment_method: PaymentMethod,
    pub is_gift: bool,
    pub gift_message: Option<String>,
    pub customer_notes: Option<String>,
}

/// What a shopper sees from the tracking lookup.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingView {
    pub order_number: String,
    pub status: OrderStatus,
    pub items: Vec<TrackingItem>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub placed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingItem {
    pub name: String,
    pub variant: String,
    pub quantity: u32,
    pub price: Decimal,
    pub fulfillment_status: FulfillmentStatus,
}

impl OrderStatus {
    /// Position on the forward path; side exits have none.
    fn rank(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Paid => Some(1),
            Self::Processing => Some(2),
            Self::PartiallyShipped => Some(3),
            Self::Shipped => Some(4),
            Self::Delivered => Some(5),
            Self::Cancelled | Self::Refunded => None,
        }
    }

    pub fn is_terminal(&self) -> bool { matches!(self, Self::Delivered | Self::Cancelled | Self::Refunded) }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Processing => "processing",
            Self::PartiallyShipped => "partially_shipped",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self { Self::Pending => "pending", Self::Paid => "paid", Self::Failed => "failed", Self::Refunded => "refunded" })
    }
}

impl FulfillmentStatus {
    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Submitted => 1,
            Self::InProduction => 2,
            Self::Shipped => 3,
            Self::Delivered => 4,
            Self::Failed => 0,
        }
    }

    /// Forward moves only; `failed` is reachable before shipping and can be re-submitted.
    pub fn can_become(&self, next: FulfillmentStatus) -> bool {
        if *self == next { return true; }
        match (self, next) {
            (Self::Pending | Self::Submitted | Self::InProduction, Self::Failed) => true,
            (_, Self::Failed) => false,
            (Self::Failed, Self::Pending) => false,
            (Self::Failed, _) => true,
            (from, to) => to.rank() > from.rank(),
        }
    }

    pub fn is_shipped(&self) -> bool { matches!(self, Self::Shipped | Self::Delivered) }

    /// Items the router may (re)submit.
    pub fn is_dispatchable(&self) -> bool { matches!(self, Self::Pending | Self::Failed) }
}

impl fmt::Display for FulfillmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Submitted => "submitted",
            Self::InProduction => "in_production",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        })
    }
}

impl Order {
    pub fn create(new: NewOrder, now: DateTime<Utc>) -> Result<Self, OrderError> {
        if new.lines.is_empty() { return Err(OrderError::NoItems); }
        let subtotal: Decimal = new.lines.iter().map(PricedLine::line_total).sum();
        if new.discount.is_sign_negative() || new.discount > subtotal { return Err(OrderError::InvalidDiscount); }
        let total = subtotal - new.discount + new.shipping + new.tax;
        let cost: Decimal = new.lines.iter().map(|l| l.unit_cost * Decimal::from(l.quantity)).sum();
        let items = new.lines.into_iter().map(|l| OrderItem {
            product_id: l.product_id, variant_id: l.variant_id, sku: l.sku, product_name: l.product_name,
            variant_name: l.variant_name, image: l.image, unit_price: l.unit_price, unit_cost: l.unit_cost,
            quantity: l.quantity, fulfillment_type: l.fulfillment_type, fulfillment_status: FulfillmentStatus::Pending,
            fulfillment_order_id: None, tracking_number: None, tracking_url: None,
        }).collect();
        let mut order = Self {
            id: Uuid::now_v7(), order_number: new.order_number, email: new.email, user_id: new.user_id, cart_id: new.cart_id,
            status: OrderStatus::Pending, payment_status: PaymentStatus::Pending, payment_method: new.payment_method,
            payment_intent_id: None, paypal_order_id: None, items, currency: new.currency,
            subtotal, discount: new.discount, discount_code: new.discount_code, shipping: new.shipping, tax: new.tax,
            total, profit: total - cost - new.shipping,
            shipping_address: new.shipping_address, shipping_method: new.shipping_method,
            is_gift: new.is_gift, gift_message: new.gift_message, customer_notes: new.customer_notes,
            internal_notes: None, printful_order_id: None, version: 0, created_at: now, updated_at: now, events: vec![],
        };
        order.raise(OrderEvent::Created { order_id: order.id, order_number: order.order_number.to_string(), total });
        Ok(order)
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_number(&self) -> &OrderNumber { &self.order_number }
    pub fn email(&self) -> &Email { &self.email }
    pub fn user_id(&self) -> Option<&str> { self.user_id.as_deref() }
    pub fn cart_id(&self) -> Option<Uuid> { self.cart_id }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn payment_status(&self) -> PaymentStatus { self.payment_status }
    pub fn payment_method(&self) -> PaymentMethod { self.payment_method }
    pub fn payment_intent_id(&self) -> Option<&str> { self.payment_intent_id.as_deref() }
    pub fn paypal_order_id(&self) -> Option<&str> { self.paypal_order_id.as_deref() }
    pub fn items(&self) -> &[OrderItem] { &self.items }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn subtotal(&self) -> Decimal { self.subtotal }
    pub fn discount(&self) -> Decimal { self.discount }
    pub fn discount_code(&self) -> Option<&CouponCode> { self.discount_code.as_ref() }
    pub fn shipping(&self) -> Decimal { self.shipping }
    pub fn tax(&self) -> Decimal { self.tax }
    pub fn total(&self) -> Decimal { self.total }
    pub fn profit(&self) -> Decimal { self.profit }
    pub fn shipping_address(&self) -> &Address { &self.shipping_address }
    pub fn is_gift(&self) -> bool { self.is_gift }
    pub fn gift_message(&self) -> Option<&str> { self.gift_message.as_deref() }
    pub fn internal_notes(&self) -> Option<&str> { self.internal_notes.as_deref() }
    pub fn printful_order_id(&self) -> Option<&str> { self.printful_order_id.as_deref() }
    pub fn version(&self) -> u64 { self.version }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

    /// Indices of items of one fulfillment type, in order.
    pub fn item_indices(&self, fulfillment_type: FulfillmentType) -> Vec<usize> {
        self.items.iter().enumerate().filter(|(_, i)| i.fulfillment_type == fulfillment_type).map(|(idx, _)| idx).collect()
    }

    /// Applies a gateway report. Re-reporting the current status is a no-op.
    pub fn apply_payment(&mut self, status: PaymentStatus, gateway_ref: Option<GatewayRef>, now: DateTime<Utc>) -> Result<PaymentTransition, OrderError> {
        let from = self.payment_status;
        if let Some(r) = gateway_ref { self.record_gateway_ref(r); }
        let transition = match (from, status) {
            (a, b) if a == b => PaymentTransition::Unchanged,
            (PaymentStatus::Pending | PaymentStatus::Failed, PaymentStatus::Paid) => {
                self.payment_status = PaymentStatus::Paid;
                self.advance(OrderStatus::Paid);
                self.raise(OrderEvent::Paid { order_id: self.id, order_number: self.order_number.to_string() });
                PaymentTransition::Changed { from, to: status }
            }
            (PaymentStatus::Pending, PaymentStatus::Failed) => {
                self.payment_status = PaymentStatus::Failed;
                self.raise(OrderEvent::PaymentFailed { order_id: self.id, order_number: self.order_number.to_string() });
                PaymentTransition::Changed { from, to: status }
            }
            // a failure reported after a success is stale
            (PaymentStatus::Paid, PaymentStatus::Failed) => PaymentTransition::Unchanged,
            (PaymentStatus::Paid, PaymentStatus::Refunded) => {
                self.payment_status = PaymentStatus::Refunded;
                if !self.status.is_terminal() { self.set(OrderStatus::Refunded); }
                self.raise(OrderEvent::Refunded { order_id: self.id, order_number: self.order_number.to_string() });
                PaymentTransition::Changed { from, to: status }
            }
            (from, to) => return Err(OrderError::InvalidPaymentTransition { from, to }),
        };
        self.touch(now);
        Ok(transition)
    }

    /// Patches one item, then re-derives the overall status from every item.
    ///
    /// Returns whether anything changed; a repeated identical update is a no-op.
    pub fn update_fulfillment(&mut self, index: usize, status: FulfillmentStatus, update: TrackingUpdate, now: DateTime<Utc>) -> Result<bool, OrderError> {
        let id = self.id;
        let item = self.items.get_mut(index).ok_or(OrderError::ItemNotFound(index))?;
        let from = item.fulfillment_status;
        if !from.can_become(status) { return Err(OrderError::InvalidFulfillmentTransition { from, to: status }); }

        let mut changed = from != status;
        item.fulfillment_status = status;
        changed |= patch(&mut item.fulfillment_order_id, update.fulfillment_order_id);
        changed |= patch(&mut item.tracking_number, update.tracking_number);
        changed |= patch(&mut item.tracking_url, update.tracking_url);
        let newly_shipped = status == FulfillmentStatus::Shipped && !from.is_shipped();
        let (tracking_number, tracking_url) = (item.tracking_number.clone(), item.tracking_url.clone());

        if from != status {
            self.raise(OrderEvent::ItemFulfillment { order_id: id, item_index: index, from, to: status });
        }
        if newly_shipped {
            self.raise(OrderEvent::ItemShipped { order_id: id, item_index: index, tracking_number, tracking_url });
        }
        if changed {
            self.derive_status();
            self.touch(now);
        }
        Ok(changed)
    }

    /// Records the gateway session opened for this order without touching payment state.
    pub fn attach_payment_ref(&mut self, gateway_ref: GatewayRef, now: DateTime<Utc>) -> Result<(), OrderError> {
        if matches!(self.payment_status, PaymentStatus::Paid | PaymentStatus::Refunded) || self.status.is_terminal() {
            return Err(OrderError::AlreadySettled);
        }
        self.record_gateway_ref(gateway_ref);
        self.touch(now);
        Ok(())
    }

    /// Moves a paid order into the processing queue once routing has run.
    pub fn mark_processing(&mut self, now: DateTime<Utc>) -> bool {
        let moved = self.advance(OrderStatus::Processing);
        if moved { self.touch(now); }
        moved
    }

    pub fn set_printful_order_id(&mut self, id: &str, now: DateTime<Utc>) {
        self.printful_order_id = Some(id.to_string());
        self.touch(now);
    }

    /// Admin status change: cancel/refund before delivery, otherwise forward only.
    pub fn set_status(&mut self, target: OrderStatus, now: DateTime<Utc>) -> Result<bool, OrderError> {
        let from = self.status;
        if from == target { return Ok(false); }
        if from.is_terminal() { return Err(OrderError::InvalidStatusTransition { from, to: target }); }
        match target {
            OrderStatus::Cancelled | OrderStatus::Refunded => self.set(target),
            _ if !self.advance(target) => return Err(OrderError::InvalidStatusTransition { from, to: target }),
            _ => {}
        }
        self.touch(now);
        Ok(true)
    }

    /// Appends a timestamped line; earlier notes are never rewritten.
    pub fn add_internal_note(&mut self, text: &str, now: DateTime<Utc>) -> Result<(), OrderError> {
        let text = text.trim();
        if text.is_empty() { return Err(OrderError::EmptyNote); }
        let line = format!("[{}] {}", now.to_rfc3339_opts(SecondsFormat::Millis, true), text);
        self.internal_notes = Some(match self.internal_notes.take() {
            Some(existing) if !existing.is_empty() => format!("{existing}\n{line}"),
            _ => line,
        });
        self.touch(now);
        Ok(())
    }

    pub fn tracking_view(&self) -> TrackingView {
        let tracked = self.items.iter().find(|i| i.tracking_number.is_some() || i.tracking_url.is_some());
        TrackingView {
            order_number: self.order_number.to_string(),
            status: self.status,
            items: self.items.iter().map(|i| TrackingItem {
                name: i.product_name.clone(), variant: i.variant_name.clone(), quantity: i.quantity,
                price: i.unit_price, fulfillment_status: i.fulfillment_status,
            }).collect(),
            tracking_number: tracked.and_then(|i| i.tracking_number.clone()),
            tracking_url: tracked.and_then(|i| i.tracking_url.clone()),
            placed_at: self.created_at,
        }
    }

    pub fn take_events(&mut self) -> Vec<OrderEvent> { std::mem::take(&mut self.events) }

    pub(crate) fn bump_version(&mut self) { self.version += 1; }

    fn derive_status(&mut self) {
        let total = self.items.len();
        let shipped = self.items.iter().filter(|i| i.fulfillment_status.is_shipped()).count();
        let delivered = self.items.iter().filter(|i| i.fulfillment_status == FulfillmentStatus::Delivered).count();
        let target = if delivered == total {
            OrderStatus::Delivered
        } else if shipped == total {
            OrderStatus::Shipped
        } else if shipped > 0 {
            OrderStatus::PartiallyShipped
        } else {
            return;
        };
        self.advance(target);
    }

    /// Forward-only move along the main path; never leaves a terminal state.
    fn advance(&mut self, target: OrderStatus) -> bool {
        match (self.status.rank(), target.rank()) {
            (Some(current), Some(next)) if next > current && !self.status.is_terminal() => {
                self.set(target);
                true
            }
            _ => false,
        }
    }

    fn set(&mut self, target: OrderStatus) {
        let from = self.status;
        self.status = target;
        self.raise(OrderEvent::StatusChanged { order_id: self.id, from, to: target });
    }

    fn record_gateway_ref(&mut self, r: GatewayRef) {
        match r {
            GatewayRef::StripeIntent(id) => self.payment_intent_id = Some(id),
            GatewayRef::PaypalOrder(id) => self.paypal_order_id = Some(id),
        }
    }

    fn raise(&mut self, e: OrderEvent) { self.events.push(e); }
    fn touch(&mut self, now: DateTime<Utc>) { self.updated_at = now; }
}

fn patch(field: &mut Option<String>, value: Option<String>) -> bool {
    match value {
        Some(v) if field.as_deref() != Some(v.as_str()) => {
            *field = Some(v);
            true
        }
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("Order has no items")]
    NoItems,
    #[error("Discount must be between zero and the subtotal")]
    InvalidDiscount,
    #[error("Order item {0} not found")]
    ItemNotFound(usize),
    #[error("Cannot move item from {from} to {to}")]
    InvalidFulfillmentTransition { from: FulfillmentStatus, to: FulfillmentStatus },
    #[error("Cannot move order from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },
    #[error("Cannot move payment from {from} to {to}")]
    InvalidPaymentTransition { from: PaymentStatus, to: PaymentStatus },
    #[error("Note must not be empty")]
    EmptyNote,
    #[error("Order is already paid or closed")]
    AlreadySettled,
}
