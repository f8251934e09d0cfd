//! Persistence.
//!
//! One document store behind the [`Store`] trait. Carts and orders are saved
//! with a compare-and-swap on their version; callers re-read and re-apply on
//! [`StoreError::VersionConflict`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{
    Cart, Category, ContactMessage, DiscountCode, DiscountRejection, MessageStatus, Order, OrderStatus, Product,
};
use crate::domain::value_objects::{CouponCode, Email, OrderNumber};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("record was modified concurrently")]
    VersionConflict,
    #[error("{0}")]
    Duplicate(String),
    #[error("{0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Self::NotFound("record".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::Duplicate(db.message().to_string()),
            other => Self::Backend(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self { Self::Backend(format!("corrupt document: {e}")) }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub tag: Option<String>,
    pub search: Option<String>,
    pub featured: Option<bool>,
    #[serde(default)]
    pub include_inactive: bool,
}

impl ProductFilter {
    pub fn matches(&self, p: &Product) -> bool {
        if !self.include_inactive && !p.is_active { return false; }
        if let Some(c) = &self.category {
            if !p.category.eq_ignore_ascii_case(c) { return false; }
        }
        if let Some(t) = &self.tag {
            if !p.tags.iter().any(|x| x.eq_ignore_ascii_case(t)) { return false; }
        }
        if let Some(f) = self.featured {
            if p.is_featured != f { return false; }
        }
        match &self.search {
            Some(q) => {
                let q = q.to_lowercase();
                p.name.to_lowercase().contains(&q) || p.description.to_lowercase().contains(&q)
            }
            None => true,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub limit: Option<usize>,
}

/// Raw webhook delivery, kept for audit and replay detection.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    pub id: Uuid,
    pub provider: String,
    /// Provider event id, or a digest of the body when the provider sends none.
    pub fingerprint: String,
    pub event_type: String,
    /// The provider's id for the order or payment the event is about.
    pub vendor_order_id: Option<String>,
    pub payload: serde_json::Value,
    /// Set once handling succeeded; unset entries are picked up by replay.
    pub processed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl WebhookEvent {
    pub fn new(provider: &str, fingerprint: String, event_type: &str, payload: serde_json::Value, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(), provider: provider.to_string(), fingerprint, event_type: event_type.to_string(),
            vendor_order_id: None, payload, processed_at: None, error: None, received_at: now,
        }
    }

    pub fn with_vendor_order_id(mut self, id: Option<String>) -> Self {
        self.vendor_order_id = id;
        self
    }

    pub fn is_processed(&self) -> bool { self.processed_at.is_some() }
}

#[async_trait]
pub trait Store: Send + Sync {
    // catalog
    async fn insert_product(&self, product: &Product) -> Result<(), StoreError>;
    async fn save_product(&self, product: &Product) -> Result<(), StoreError>;
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError>;
    async fn get_product_by_slug(&self, slug: &str) -> Result<Option<Product>, StoreError>;
    async fn get_products(&self, ids: &[Uuid]) -> Result<Vec<Product>, StoreError>;
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError>;
    async fn insert_category(&self, category: &Category) -> Result<(), StoreError>;
    async fn list_categories(&self) -> Result<Vec<Category>, StoreError>;

    // carts
    async fn get_cart(&self, id: Uuid) -> Result<Option<Cart>, StoreError>;
    async fn find_cart_by_session(&self, session_id: &str) -> Result<Option<Cart>, StoreError>;
    async fn find_cart_by_user(&self, user_id: &str) -> Result<Option<Cart>, StoreError>;
    /// Writes the cart if the stored version still equals `cart.version()`, then bumps it.
    async fn save_cart(&self, cart: &mut Cart) -> Result<(), StoreError>;
    async fn delete_cart(&self, id: Uuid) -> Result<(), StoreError>;

    // orders
    async fn insert_order(&self, order: &mut Order) -> Result<(), StoreError>;
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;
    async fn find_order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, StoreError>;
    /// Looks up by card payment intent id or wallet order id.
    async fn find_order_by_payment_ref(&self, reference: &str) -> Result<Option<Order>, StoreError>;
    async fn save_order(&self, order: &mut Order) -> Result<(), StoreError>;
    /// Newest first.
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError>;

    // discounts
    async fn insert_discount(&self, discount: &DiscountCode) -> Result<(), StoreError>;
    async fn get_discount(&self, code: &CouponCode) -> Result<Option<DiscountCode>, StoreError>;
    async fn list_discounts(&self) -> Result<Vec<DiscountCode>, StoreError>;
    async fn save_discount(&self, discount: &DiscountCode) -> Result<(), StoreError>;
    /// Consumes one use atomically; the inner result carries a lost race.
    async fn redeem_discount(&self, code: &CouponCode, email: &Email) -> Result<Result<DiscountCode, DiscountRejection>, StoreError>;

    // webhook log
    /// Appends the event unless its fingerprint is known. Returns whether it was already processed.
    async fn log_webhook_event(&self, event: &WebhookEvent) -> Result<bool, StoreError>;
    /// Records the handling outcome; success stamps `processed_at` with `now`.
    async fn mark_webhook_event(&self, provider: &str, fingerprint: &str, error: Option<String>, now: DateTime<Utc>) -> Result<(), StoreError>;
    async fn unprocessed_webhook_events(&self, provider: &str) -> Result<Vec<WebhookEvent>, StoreError>;

    // contact messages
    async fn insert_message(&self, message: &ContactMessage) -> Result<(), StoreError>;
    async fn list_messages(&self, status: Option<MessageStatus>) -> Result<Vec<ContactMessage>, StoreError>;
    async fn set_message_status(&self, id: Uuid, status: MessageStatus) -> Result<ContactMessage, StoreError>;
}
