//! Fulfillment vendor clients.

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod printful;

pub use printful::PrintfulClient;

#[derive(Debug, Error)]
pub enum VendorError {
    #[error("vendor not configured")]
    NotConfigured,
    #[error("vendor rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("vendor timed out")]
    Timeout,
    #[error("vendor transport error: {0}")]
    Transport(String),
    #[error("unexpected vendor response: {0}")]
    Decode(String),
}

impl VendorError {
    /// True only when the vendor certainly did not accept the order.
    ///
    /// Timeouts and transport failures are ambiguous: the order may exist
    /// vendor-side, so items stay pending for a retry instead of failing.
    pub fn is_definitive(&self) -> bool {
        matches!(self, Self::NotConfigured | Self::Rejected { .. })
    }
}

impl From<reqwest::Error> for VendorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Recipient {
    pub name: String,
    pub address1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address2: Option<String>,
    pub city: String,
    pub state_code: String,
    pub country_code: String,
    pub zip: String,
    pub phone: String,
    pub email: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VendorLineItem {
    pub sync_variant_id: u64,
    pub quantity: u32,
    pub retail_price: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VendorOrderRequest {
    /// Our order number; vendor webhooks echo it back.
    pub external_id: String,
    pub recipient: Recipient,
    pub items: Vec<VendorLineItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gift: Option<GiftNote>,
    pub packing_slip: PackingSlip,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GiftNote {
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PackingSlip {
    pub email: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct VendorOrder {
    pub id: String,
    pub status: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Shipment {
    pub carrier: String,
    pub tracking_number: String,
    pub tracking_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VendorOrderStatus {
    pub id: String,
    pub status: String,
    pub shipments: Vec<Shipment>,
}

/// Print-on-demand vendor with an order API.
#[automock]
#[async_trait]
pub trait PrintOnDemandClient: Send + Sync {
    /// Creates and confirms a vendor order.
    async fn create_order(&self, request: &VendorOrderRequest) -> Result<VendorOrder, VendorError>;

    /// Current vendor state, including any shipments.
    async fn get_order(&self, vendor_order_id: &str) -> Result<VendorOrderStatus, VendorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_explicit_rejections_are_definitive() {
        assert!(VendorError::Rejected { status: 400, message: "bad variant".into() }.is_definitive());
        assert!(VendorError::NotConfigured.is_definitive());
        assert!(!VendorError::Timeout.is_definitive());
        assert!(!VendorError::Transport("reset".into()).is_definitive());
        assert!(!VendorError::Decode("eof".into()).is_definitive());
    }
}
