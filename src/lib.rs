//! Storefront order lifecycle service
//!
//! Carts, checkout, payment confirmation and fulfillment routing for a small
//! print-on-demand / dropship storefront.
//!
//! ## Features
//! - Product catalog with per-variant pricing and cost tracking
//! - Session and user carts with discount codes
//! - Orders with frozen price snapshots and per-item fulfillment state
//! - Card and wallet payment handoff with verified webhooks
//! - Fulfillment routing to vendors, admin notification or manual handling

use thiserror::Error;

pub mod api;
pub mod config;
pub mod domain;
pub mod notify;
pub mod payments;
pub mod publisher;
pub mod services;
pub mod signature;
pub mod store;
pub mod vendors;

use domain::aggregates::{CartError, DiscountRejection, OrderError, ProductError};
use notify::NotifyError;
use payments::GatewayError;
use signature::SignatureError;
use store::StoreError;
use vendors::VendorError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("vendor error: {0}")]
    Vendor(String),

    #[error("signature error: {0}")]
    Signature(String),

    #[error("concurrent update, please retry")]
    Conflict,

    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, StorefrontError>;

impl StorefrontError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

impl From<StoreError> for StorefrontError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::VersionConflict => Self::Conflict,
            StoreError::Duplicate(what) => Self::Validation(format!("{what} already exists")),
            StoreError::Backend(msg) => Self::Storage(msg),
        }
    }
}

impl From<CartError> for StorefrontError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::ItemNotFound => Self::NotFound(e.to_string()),
            _ => Self::Validation(e.to_string()),
        }
    }
}

impl From<OrderError> for StorefrontError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::ItemNotFound(_) => Self::NotFound(e.to_string()),
            _ => Self::Validation(e.to_string()),
        }
    }
}

impl From<ProductError> for StorefrontError {
    fn from(e: ProductError) -> Self { Self::Validation(e.to_string()) }
}

impl From<DiscountRejection> for StorefrontError {
    fn from(e: DiscountRejection) -> Self { Self::Validation(e.to_string()) }
}

impl From<VendorError> for StorefrontError {
    fn from(e: VendorError) -> Self { Self::Vendor(e.to_string()) }
}

impl From<GatewayError> for StorefrontError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::InvalidAmount => Self::Validation(e.to_string()),
            _ => Self::Vendor(e.to_string()),
        }
    }
}

impl From<NotifyError> for StorefrontError {
    fn from(e: NotifyError) -> Self { Self::Vendor(e.to_string()) }
}

impl From<SignatureError> for StorefrontError {
    fn from(e: SignatureError) -> Self { Self::Signature(e.to_string()) }
}

impl From<validator::ValidationErrors> for StorefrontError {
    fn from(e: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = e.field_errors().keys().map(|k| k.to_string()).collect();
        fields.sort();
        Self::Validation(format!("invalid fields: {}", fields.join(", ")))
    }
}
