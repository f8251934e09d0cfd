//! Domain events
use crate::domain::aggregates::{FulfillmentStatus, OrderStatus, PaymentStatus};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: Uuid, order_number: String, total: Decimal },
    Paid { order_id: Uuid, order_number: String },
    PaymentFailed { order_id: Uuid, order_number: String },
    Refunded { order_id: Uuid, order_number: String },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
    ItemFulfillment { order_id: Uuid, item_index: usize, from: FulfillmentStatus, to: FulfillmentStatus },
    ItemShipped { order_id: Uuid, item_index: usize, tracking_number: Option<String>, tracking_url: Option<String> },
}

impl OrderEvent {
    /// Subject suffix used when publishing.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Paid { .. } => "paid",
            Self::PaymentFailed { .. } => "payment_failed",
            Self::Refunded { .. } => "refunded",
            Self::StatusChanged { .. } => "status_changed",
            Self::ItemFulfillment { .. } => "item_fulfillment",
            Self::ItemShipped { .. } => "item_shipped",
        }
    }

    pub fn order_id(&self) -> Uuid {
        match self {
            Self::Created { order_id, .. }
            | Self::Paid { order_id, .. }
            | Self::PaymentFailed { order_id, .. }
            | Self::Refunded { order_id, .. }
            | Self::StatusChanged { order_id, .. }
            | Self::ItemFulfillment { order_id, .. }
            | Self::ItemShipped { order_id, .. } => *order_id,
        }
    }
}

/// Payment transition reported back to callers of `Order::apply_payment`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaymentTransition {
    Unchanged,
    Changed { from: PaymentStatus, to: PaymentStatus },
}

impl PaymentTransition {
    pub fn became(&self, status: PaymentStatus) -> bool {
        matches!(self, Self::Changed { to, .. } if *to == status)
    }
}
