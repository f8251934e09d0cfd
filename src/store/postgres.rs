//! Postgres store. Aggregates live in JSONB `doc` columns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{query, query_scalar};
use uuid::Uuid;

use super::{OrderFilter, ProductFilter, Store, StoreError, WebhookEvent};
use crate::domain::aggregates::{
    Cart, Category, ContactMessage, DiscountCode, DiscountRejection, MessageStatus, Order, Product,
};
use crate::domain::value_objects::{CouponCode, Email, OrderNumber};

const ORDER_COLUMNS_SQL: &str = "SELECT doc FROM orders";

type WebhookRow = (Uuid, String, String, String, Option<String>, serde_json::Value, Option<DateTime<Utc>>, Option<String>, DateTime<Utc>);

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { pool })
    }

    async fn fetch_order(&self, clause: &str, value: &str) -> Result<Option<Order>, StoreError> {
        let sql = format!("{ORDER_COLUMNS_SQL} WHERE {clause} = $1 LIMIT 1");
        Ok(query_scalar::<_, Json<Order>>(&sql).bind(value).fetch_optional(&self.pool).await?.map(|Json(o)| o))
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_product(&self, product: &Product) -> Result<(), StoreError> {
        query("INSERT INTO products (id, slug, is_active, doc, created_at) VALUES ($1, $2, $3, $4, $5)")
            .bind(product.id).bind(&product.slug).bind(product.is_active).bind(Json(product)).bind(product.created_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn save_product(&self, product: &Product) -> Result<(), StoreError> {
        let result = query("UPDATE products SET slug = $2, is_active = $3, doc = $4 WHERE id = $1")
            .bind(product.id).bind(&product.slug).bind(product.is_active).bind(Json(product))
            .execute(&self.pool).await?;
        if result.rows_affected() == 0 { return Err(StoreError::NotFound("product".into())); }
        Ok(())
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        let row = query_scalar::<_, Json<Product>>("SELECT doc FROM products WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(|Json(p)| p))
    }

    async fn get_product_by_slug(&self, slug: &str) -> Result<Option<Product>, StoreError> {
        let row = query_scalar::<_, Json<Product>>("SELECT doc FROM products WHERE slug = $1").bind(slug).fetch_optional(&self.pool).await?;
        Ok(row.map(|Json(p)| p))
    }

    async fn get_products(&self, ids: &[Uuid]) -> Result<Vec<Product>, StoreError> {
        let rows = query_scalar::<_, Json<Product>>("SELECT doc FROM products WHERE id = ANY($1)").bind(ids).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|Json(p)| p).collect())
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        let rows = query_scalar::<_, Json<Product>>("SELECT doc FROM products WHERE ($1 OR is_active) ORDER BY created_at DESC, id DESC")
            .bind(filter.include_inactive).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|Json(p)| p).filter(|p| filter.matches(p)).collect())
    }

    async fn insert_category(&self, category: &Category) -> Result<(), StoreError> {
        query("INSERT INTO categories (id, slug, sort_order, name, doc) VALUES ($1, $2, $3, $4, $5)")
            .bind(category.id).bind(&category.slug).bind(category.sort_order).bind(&category.name).bind(Json(category))
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        let rows = query_scalar::<_, Json<Category>>("SELECT doc FROM categories ORDER BY sort_order, name").fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|Json(c)| c).collect())
    }

    async fn get_cart(&self, id: Uuid) -> Result<Option<Cart>, StoreError> {
        let row = query_scalar::<_, Json<Cart>>("SELECT doc FROM carts WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(|Json(c)| c))
    }

    async fn find_cart_by_session(&self, session_id: &str) -> Result<Option<Cart>, StoreError> {
        let row = query_scalar::<_, Json<Cart>>("SELECT doc FROM carts WHERE session_id = $1 ORDER BY updated_at DESC LIMIT 1")
            .bind(session_id).fetch_optional(&self.pool).await?;
        Ok(row.map(|Json(c)| c))
    }

    async fn find_cart_by_user(&self, user_id: &str) -> Result<Option<Cart>, StoreError> {
        let row = query_scalar::<_, Json<Cart>>("SELECT doc FROM carts WHERE user_id = $1 ORDER BY updated_at DESC LIMIT 1")
            .bind(user_id).fetch_optional(&self.pool).await?;
        Ok(row.map(|Json(c)| c))
    }

    async fn save_cart(&self, cart: &mut Cart) -> Result<(), StoreError> {
        let expected = i64::try_from(cart.version()).map_err(|e| StoreError::Backend(e.to_string()))?;
        let mut next = cart.clone();
        next.bump_version();
        let result = if expected == 0 {
            query("INSERT INTO carts (id, session_id, user_id, version, doc, updated_at) VALUES ($1, $2, $3, 1, $4, $5) ON CONFLICT (id) DO NOTHING")
                .bind(next.id()).bind(next.session_id()).bind(next.user_id()).bind(Json(&next)).bind(next.updated_at())
                .execute(&self.pool).await?
        } else {
            query("UPDATE carts SET user_id = $2, version = version + 1, doc = $3, updated_at = $4 WHERE id = $1 AND version = $5")
                .bind(next.id()).bind(next.user_id()).bind(Json(&next)).bind(next.updated_at()).bind(expected)
                .execute(&self.pool).await?
        };
        if result.rows_affected() == 0 { return Err(StoreError::VersionConflict); }
        *cart = next;
        Ok(())
    }

    async fn delete_cart(&self, id: Uuid) -> Result<(), StoreError> {
        query("DELETE FROM carts WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_order(&self, order: &mut Order) -> Result<(), StoreError> {
        let mut next = order.clone();
        next.bump_version();
        query("INSERT INTO orders (id, order_number, status, payment_intent_id, paypal_order_id, version, doc, created_at) VALUES ($1, $2, $3, $4, $5, 1, $6, $7)")
            .bind(next.id()).bind(next.order_number().as_str()).bind(next.status().as_str())
            .bind(next.payment_intent_id()).bind(next.paypal_order_id()).bind(Json(&next)).bind(next.created_at())
            .execute(&self.pool).await?;
        order.bump_version();
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let row = query_scalar::<_, Json<Order>>("SELECT doc FROM orders WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(|Json(o)| o))
    }

    async fn find_order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, StoreError> {
        self.fetch_order("order_number", number.as_str()).await
    }

    async fn find_order_by_payment_ref(&self, reference: &str) -> Result<Option<Order>, StoreError> {
        match self.fetch_order("payment_intent_id", reference).await? {
            Some(order) => Ok(Some(order)),
            None => self.fetch_order("paypal_order_id", reference).await,
        }
    }

    async fn save_order(&self, order: &mut Order) -> Result<(), StoreError> {
        let expected = i64::try_from(order.version()).map_err(|e| StoreError::Backend(e.to_string()))?;
        let mut next = order.clone();
        next.bump_version();
        let result = query("UPDATE orders SET status = $2, payment_intent_id = $3, paypal_order_id = $4, version = version + 1, doc = $5 WHERE id = $1 AND version = $6")
            .bind(next.id()).bind(next.status().as_str()).bind(next.payment_intent_id()).bind(next.paypal_order_id())
            .bind(Json(&next)).bind(expected)
            .execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            let exists: Option<i64> = query_scalar("SELECT version FROM orders WHERE id = $1").bind(next.id()).fetch_optional(&self.pool).await?;
            return Err(match exists {
                Some(_) => StoreError::VersionConflict,
                None => StoreError::NotFound("order".into()),
            });
        }
        order.bump_version();
        Ok(())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let limit = filter.limit.and_then(|l| i64::try_from(l).ok());
        let rows = query_scalar::<_, Json<Order>>(
            "SELECT doc FROM orders WHERE ($1::TEXT IS NULL OR status = $1) ORDER BY created_at DESC, id DESC LIMIT $2",
        )
        .bind(filter.status.map(|s| s.as_str())).bind(limit)
        .fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|Json(o)| o).collect())
    }

    async fn insert_discount(&self, discount: &DiscountCode) -> Result<(), StoreError> {
        query("INSERT INTO discount_codes (code, doc) VALUES ($1, $2)")
            .bind(discount.code.as_str()).bind(Json(discount))
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn get_discount(&self, code: &CouponCode) -> Result<Option<DiscountCode>, StoreError> {
        let row = query_scalar::<_, Json<DiscountCode>>("SELECT doc FROM discount_codes WHERE code = $1").bind(code.as_str()).fetch_optional(&self.pool).await?;
        Ok(row.map(|Json(d)| d))
    }

    async fn list_discounts(&self) -> Result<Vec<DiscountCode>, StoreError> {
        let rows = query_scalar::<_, Json<DiscountCode>>("SELECT doc FROM discount_codes ORDER BY code").fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|Json(d)| d).collect())
    }

    async fn save_discount(&self, discount: &DiscountCode) -> Result<(), StoreError> {
        let result = query("UPDATE discount_codes SET doc = $2 WHERE code = $1")
            .bind(discount.code.as_str()).bind(Json(discount))
            .execute(&self.pool).await?;
        if result.rows_affected() == 0 { return Err(StoreError::NotFound(format!("discount code {}", discount.code))); }
        Ok(())
    }

    async fn redeem_discount(&self, code: &CouponCode, email: &Email) -> Result<Result<DiscountCode, DiscountRejection>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = query_scalar::<_, Json<DiscountCode>>("SELECT doc FROM discount_codes WHERE code = $1 FOR UPDATE")
            .bind(code.as_str()).fetch_optional(&mut *tx).await?;
        let Some(Json(mut discount)) = row else { return Ok(Err(DiscountRejection::Invalid)) };
        if let Err(rejection) = discount.redeem(email) { return Ok(Err(rejection)); }
        query("UPDATE discount_codes SET doc = $2 WHERE code = $1")
            .bind(code.as_str()).bind(Json(&discount))
            .execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(Ok(discount))
    }

    async fn log_webhook_event(&self, event: &WebhookEvent) -> Result<bool, StoreError> {
        let inserted = query(
            "INSERT INTO webhook_events (id, provider, fingerprint, event_type, vendor_order_id, payload, processed_at, error, received_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NULL, NULL, $7) ON CONFLICT (provider, fingerprint) DO NOTHING",
        )
        .bind(event.id).bind(&event.provider).bind(&event.fingerprint).bind(&event.event_type)
        .bind(&event.vendor_order_id).bind(&event.payload).bind(event.received_at)
        .execute(&self.pool).await?;
        if inserted.rows_affected() == 1 { return Ok(false); }
        let processed: bool = query_scalar("SELECT processed_at IS NOT NULL FROM webhook_events WHERE provider = $1 AND fingerprint = $2")
            .bind(&event.provider).bind(&event.fingerprint)
            .fetch_one(&self.pool).await?;
        Ok(processed)
    }

    async fn mark_webhook_event(&self, provider: &str, fingerprint: &str, error: Option<String>, now: DateTime<Utc>) -> Result<(), StoreError> {
        let result = query("UPDATE webhook_events SET processed_at = $3, error = $4 WHERE provider = $1 AND fingerprint = $2")
            .bind(provider).bind(fingerprint).bind(error.is_none().then_some(now)).bind(error)
            .execute(&self.pool).await?;
        if result.rows_affected() == 0 { return Err(StoreError::NotFound("webhook event".into())); }
        Ok(())
    }

    async fn unprocessed_webhook_events(&self, provider: &str) -> Result<Vec<WebhookEvent>, StoreError> {
        let rows: Vec<WebhookRow> = sqlx::query_as(
            "SELECT id, provider, fingerprint, event_type, vendor_order_id, payload, processed_at, error, received_at \
             FROM webhook_events WHERE provider = $1 AND processed_at IS NULL ORDER BY received_at",
        )
        .bind(provider)
        .fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(id, provider, fingerprint, event_type, vendor_order_id, payload, processed_at, error, received_at)| WebhookEvent {
            id, provider, fingerprint, event_type, vendor_order_id, payload, processed_at, error, received_at,
        }).collect())
    }

    async fn insert_message(&self, message: &ContactMessage) -> Result<(), StoreError> {
        query("INSERT INTO contact_messages (id, status, doc, created_at) VALUES ($1, $2, $3, $4)")
            .bind(message.id).bind(message.status.as_str()).bind(Json(message)).bind(message.created_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn list_messages(&self, status: Option<MessageStatus>) -> Result<Vec<ContactMessage>, StoreError> {
        let rows = query_scalar::<_, Json<ContactMessage>>(
            "SELECT doc FROM contact_messages WHERE ($1::TEXT IS NULL OR status = $1) ORDER BY created_at DESC",
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|Json(m)| m).collect())
    }

    async fn set_message_status(&self, id: Uuid, status: MessageStatus) -> Result<ContactMessage, StoreError> {
        let row = query_scalar::<_, Json<ContactMessage>>(
            "UPDATE contact_messages SET status = $2, doc = jsonb_set(doc, '{status}', to_jsonb($2::TEXT)) WHERE id = $1 RETURNING doc",
        )
        .bind(id).bind(status.as_str())
        .fetch_optional(&self.pool).await?;
        row.map(|Json(m)| m).ok_or_else(|| StoreError::NotFound("message".into()))
    }
}
