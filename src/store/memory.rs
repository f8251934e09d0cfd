//! In-process store for tests and local development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{OrderFilter, ProductFilter, Store, StoreError, WebhookEvent};
use crate::domain::aggregates::{
    Cart, Category, ContactMessage, DiscountCode, DiscountRejection, MessageStatus, Order, Product,
};
use crate::domain::value_objects::{CouponCode, Email, OrderNumber};

#[derive(Default)]
struct Tables {
    products: HashMap<Uuid, Product>,
    categories: Vec<Category>,
    carts: HashMap<Uuid, Cart>,
    orders: HashMap<Uuid, Order>,
    discounts: HashMap<String, DiscountCode>,
    webhooks: Vec<WebhookEvent>,
    messages: Vec<ContactMessage>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

/// Stored copies never carry pending events.
fn detached(order: &Order) -> Order {
    let mut copy = order.clone();
    copy.take_events();
    copy
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_product(&self, product: &Product) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        if t.products.values().any(|p| p.slug == product.slug) {
            return Err(StoreError::Duplicate(format!("product slug {}", product.slug)));
        }
        t.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn save_product(&self, product: &Product) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        if !t.products.contains_key(&product.id) { return Err(StoreError::NotFound("product".into())); }
        if t.products.values().any(|p| p.slug == product.slug && p.id != product.id) {
            return Err(StoreError::Duplicate(format!("product slug {}", product.slug)));
        }
        t.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        Ok(self.tables.read().await.products.get(&id).cloned())
    }

    async fn get_product_by_slug(&self, slug: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.tables.read().await.products.values().find(|p| p.slug == slug).cloned())
    }

    async fn get_products(&self, ids: &[Uuid]) -> Result<Vec<Product>, StoreError> {
        let t = self.tables.read().await;
        Ok(ids.iter().filter_map(|id| t.products.get(id).cloned()).collect())
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        let t = self.tables.read().await;
        let mut products: Vec<Product> = t.products.values().filter(|p| filter.matches(p)).cloned().collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(products)
    }

    async fn insert_category(&self, category: &Category) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        if t.categories.iter().any(|c| c.slug == category.slug) {
            return Err(StoreError::Duplicate(format!("category {}", category.slug)));
        }
        t.categories.push(category.clone());
        Ok(())
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        let mut categories = self.tables.read().await.categories.clone();
        categories.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.name.cmp(&b.name)));
        Ok(categories)
    }

    async fn get_cart(&self, id: Uuid) -> Result<Option<Cart>, StoreError> {
        Ok(self.tables.read().await.carts.get(&id).cloned())
    }

    async fn find_cart_by_session(&self, session_id: &str) -> Result<Option<Cart>, StoreError> {
        Ok(self.tables.read().await.carts.values().find(|c| c.session_id() == session_id).cloned())
    }

    async fn find_cart_by_user(&self, user_id: &str) -> Result<Option<Cart>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.carts.values().filter(|c| c.user_id() == Some(user_id)).max_by_key(|c| c.updated_at()).cloned())
    }

    async fn save_cart(&self, cart: &mut Cart) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        let stored = t.carts.get(&cart.id()).map(Cart::version);
        match stored {
            Some(v) if v == cart.version() => {}
            None if cart.version() == 0 => {}
            _ => return Err(StoreError::VersionConflict),
        }
        cart.bump_version();
        t.carts.insert(cart.id(), cart.clone());
        Ok(())
    }

    async fn delete_cart(&self, id: Uuid) -> Result<(), StoreError> {
        self.tables.write().await.carts.remove(&id);
        Ok(())
    }

    async fn insert_order(&self, order: &mut Order) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        if t.orders.values().any(|o| o.order_number() == order.order_number()) {
            return Err(StoreError::Duplicate(format!("order {}", order.order_number())));
        }
        order.bump_version();
        t.orders.insert(order.id(), detached(order));
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn find_order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, StoreError> {
        Ok(self.tables.read().await.orders.values().find(|o| o.order_number() == number).cloned())
    }

    async fn find_order_by_payment_ref(&self, reference: &str) -> Result<Option<Order>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.orders.values()
            .find(|o| o.payment_intent_id() == Some(reference) || o.paypal_order_id() == Some(reference))
            .cloned())
    }

    async fn save_order(&self, order: &mut Order) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        match t.orders.get(&order.id()) {
            Some(stored) if stored.version() == order.version() => {}
            Some(_) => return Err(StoreError::VersionConflict),
            None => return Err(StoreError::NotFound("order".into())),
        }
        order.bump_version();
        t.orders.insert(order.id(), detached(order));
        Ok(())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let t = self.tables.read().await;
        let mut orders: Vec<Order> = t.orders.values()
            .filter(|o| filter.status.map_or(true, |s| o.status() == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then(b.id().cmp(&a.id())));
        if let Some(limit) = filter.limit { orders.truncate(limit); }
        Ok(orders)
    }

    async fn insert_discount(&self, discount: &DiscountCode) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        let key = discount.code.to_string();
        if t.discounts.contains_key(&key) { return Err(StoreError::Duplicate(format!("discount code {key}"))); }
        t.discounts.insert(key, discount.clone());
        Ok(())
    }

    async fn get_discount(&self, code: &CouponCode) -> Result<Option<DiscountCode>, StoreError> {
        Ok(self.tables.read().await.discounts.get(code.as_str()).cloned())
    }

    async fn list_discounts(&self) -> Result<Vec<DiscountCode>, StoreError> {
        let mut codes: Vec<DiscountCode> = self.tables.read().await.discounts.values().cloned().collect();
        codes.sort_by(|a, b| a.code.as_str().cmp(b.code.as_str()));
        Ok(codes)
    }

    async fn save_discount(&self, discount: &DiscountCode) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        match t.discounts.get_mut(discount.code.as_str()) {
            Some(stored) => {
                *stored = discount.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("discount code {}", discount.code))),
        }
    }

    async fn redeem_discount(&self, code: &CouponCode, email: &Email) -> Result<Result<DiscountCode, DiscountRejection>, StoreError> {
        let mut t = self.tables.write().await;
        let Some(stored) = t.discounts.get_mut(code.as_str()) else {
            return Ok(Err(DiscountRejection::Invalid));
        };
        Ok(stored.redeem(email).map(|()| stored.clone()))
    }

    async fn log_webhook_event(&self, event: &WebhookEvent) -> Result<bool, StoreError> {
        let mut t = self.tables.write().await;
        if let Some(existing) = t.webhooks.iter().find(|e| e.provider == event.provider && e.fingerprint == event.fingerprint) {
            return Ok(existing.is_processed());
        }
        t.webhooks.push(event.clone());
        Ok(false)
    }

    async fn mark_webhook_event(&self, provider: &str, fingerprint: &str, error: Option<String>, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        let event = t.webhooks.iter_mut()
            .find(|e| e.provider == provider && e.fingerprint == fingerprint)
            .ok_or_else(|| StoreError::NotFound("webhook event".into()))?;
        event.processed_at = error.is_none().then_some(now);
        event.error = error;
        Ok(())
    }

    async fn unprocessed_webhook_events(&self, provider: &str) -> Result<Vec<WebhookEvent>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.webhooks.iter().filter(|e| e.provider == provider && !e.is_processed()).cloned().collect())
    }

    async fn insert_message(&self, message: &ContactMessage) -> Result<(), StoreError> {
        self.tables.write().await.messages.push(message.clone());
        Ok(())
    }

    async fn list_messages(&self, status: Option<MessageStatus>) -> Result<Vec<ContactMessage>, StoreError> {
        let t = self.tables.read().await;
        let mut messages: Vec<ContactMessage> = t.messages.iter().filter(|m| status.map_or(true, |s| m.status == s)).cloned().collect();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(messages)
    }

    async fn set_message_status(&self, id: Uuid, status: MessageStatus) -> Result<ContactMessage, StoreError> {
        let mut t = self.tables.write().await;
        let message = t.messages.iter_mut().find(|m| m.id == id).ok_or_else(|| StoreError::NotFound("message".into()))?;
        message.status = status;
        Ok(message.clone())
    }
}
