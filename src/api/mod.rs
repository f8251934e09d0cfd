//! HTTP surface.
//!
//! Thin axum handlers over [`crate::services`]. Shopper routes live under
//! `/api/v1`, back-office routes under `/api/v1/admin` so a gateway can
//! guard that prefix.

use axum::{http::StatusCode, routing::{delete, get, post, put}, Json, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::services::AppState;
use crate::StorefrontError;

mod admin;
mod shop;

pub type ApiResult<T> = Result<T, (StatusCode, String)>;

impl From<StorefrontError> for (StatusCode, String) {
    fn from(e: StorefrontError) -> Self {
        match e {
            StorefrontError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            StorefrontError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            StorefrontError::Signature(_) => (StatusCode::BAD_REQUEST, "invalid signature".to_string()),
            StorefrontError::Conflict => (StatusCode::CONFLICT, e.to_string()),
            StorefrontError::Vendor(msg) => {
                tracing::error!(error = %msg, "upstream call failed");
                (StatusCode::BAD_GATEWAY, "An upstream service is unavailable, please try again".to_string())
            }
            StorefrontError::Storage(msg) => {
                tracing::error!(error = %msg, "storage failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "storefront"})) }))
        .route("/api/v1/products", get(shop::list_products))
        .route("/api/v1/products/:slug", get(shop::get_product))
        .route("/api/v1/categories", get(shop::list_categories))
        .route("/api/v1/cart/:session", get(shop::get_cart).delete(shop::clear_cart))
        .route("/api/v1/cart/:session/items", post(shop::add_to_cart))
        .route("/api/v1/cart/:session/items/:id", put(shop::update_cart_item).delete(shop::remove_cart_item))
        .route("/api/v1/cart/:session/discount", post(shop::apply_discount).delete(shop::remove_discount))
        .route("/api/v1/cart/:session/merge", post(shop::merge_cart))
        .route("/api/v1/discounts/validate", post(shop::validate_discount))
        .route("/api/v1/checkout", post(shop::checkout))
        .route("/api/v1/payments/stripe/intent", post(shop::create_stripe_intent))
        .route("/api/v1/payments/paypal/orders", post(shop::create_paypal_order))
        .route("/api/v1/payments/paypal/capture", post(shop::capture_paypal))
        .route("/api/v1/webhooks/stripe", post(shop::stripe_webhook))
        .route("/api/v1/webhooks/printful", post(shop::printful_webhook))
        .route("/api/v1/orders/track", post(shop::track_order))
        .route("/api/v1/contact", post(shop::contact))
        .route("/api/v1/fulfillment/process", post(admin::process_fulfillment))
        .route("/api/v1/admin/orders", get(admin::list_orders))
        .route("/api/v1/admin/orders/stats", get(admin::order_stats))
        .route("/api/v1/admin/orders/:id", get(admin::get_order))
        .route("/api/v1/admin/orders/:id/status", put(admin::set_order_status))
        .route("/api/v1/admin/orders/:id/items/:index", put(admin::update_order_item))
        .route("/api/v1/admin/orders/:id/notes", post(admin::add_order_note))
        .route("/api/v1/admin/orders/:id/tracking/sync", post(admin::sync_tracking))
        .route("/api/v1/admin/products", get(admin::list_products).post(admin::create_product))
        .route("/api/v1/admin/products/:id", put(admin::update_product).delete(admin::delete_product))
        .route("/api/v1/admin/categories", post(admin::create_category))
        .route("/api/v1/admin/discounts", get(admin::list_discounts).post(admin::create_discount))
        .route("/api/v1/admin/discounts/:code", delete(admin::deactivate_discount))
        .route("/api/v1/admin/messages", get(admin::list_messages))
        .route("/api/v1/admin/messages/:id", put(admin::set_message_status))
        .route("/api/v1/admin/webhooks/:provider/replay", post(admin::replay_webhooks))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::tests::{new_product, variant};
    use crate::domain::aggregates::FulfillmentType;
    use crate::services::tests::memory_state;
    use crate::services::{catalog, Integrations};
    use crate::signature::sign_stripe;
    use axum::body::Body;
    use axum::http::{header, Request};
    use rust_decimal_macros::dec;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(b) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(b.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(memory_state());
        let (status, body) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[test]
    fn test_error_mapping_hides_internals() {
        let (status, msg) = <(StatusCode, String)>::from(StorefrontError::Vendor("printful 500: secret detail".into()));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(!msg.contains("secret"));
        let (status, msg) = <(StatusCode, String)>::from(StorefrontError::Signature("signature does not match".into()));
        assert_eq!((status, msg.as_str()), (StatusCode::BAD_REQUEST, "invalid signature"));
        let (status, msg) = <(StatusCode, String)>::from(StorefrontError::validation("Cart is empty"));
        assert_eq!((status, msg.as_str()), (StatusCode::BAD_REQUEST, "Cart is empty"));
        assert_eq!(<(StatusCode, String)>::from(StorefrontError::Conflict).0, StatusCode::CONFLICT);
        assert_eq!(<(StatusCode, String)>::from(StorefrontError::Storage("pool closed".into())).0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_cart_and_checkout_flow() {
        let state = memory_state();
        let product = catalog::create_product(&state, new_product("Plush Set", FulfillmentType::Manual, vec![variant("std", "DB-PLUSH-001", dec!(34.99), dec!(12))])).await.unwrap();
        let app = router(state);

        let (status, cart) = call(&app, "POST", "/api/v1/cart/s1/items", Some(json!({"productId": product.id, "variantId": "std", "quantity": 2}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cart["summary"]["subtotal"], json!("69.98"));

        let (status, _) = call(&app, "POST", "/api/v1/cart/s1/discount", Some(json!({"code": "NOPE"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let checkout = json!({
            "sessionId": "s1", "email": "mei@example.com", "paymentMethod": "stripe",
            "shippingAddress": {"firstName": "Mei", "lastName": "Chen", "address1": "1 Main St", "city": "Portland",
                "state": "OR", "postalCode": "97201", "country": "US", "phone": ""}
        });
        let (status, order) = call(&app, "POST", "/api/v1/checkout", Some(checkout)).await;
        assert_eq!(status, StatusCode::CREATED, "{order}");
        assert_eq!(order["status"], "pending");

        let track = json!({"orderNumber": order["orderNumber"], "email": "MEI@example.com"});
        let (status, view) = call(&app, "POST", "/api/v1/orders/track", Some(track)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["items"].as_array().map(Vec::len), Some(1));

        let miss = json!({"orderNumber": order["orderNumber"], "email": "someone@example.com"});
        let (status, body) = call(&app, "POST", "/api/v1/orders/track", Some(miss)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, Value::String(crate::services::orders::TRACKING_MISS.to_string()));
    }

    #[tokio::test]
    async fn test_checkout_with_empty_cart_is_400() {
        let app = router(memory_state());
        let checkout = json!({
            "sessionId": "empty", "email": "mei@example.com", "paymentMethod": "paypal",
            "shippingAddress": {"firstName": "Mei", "lastName": "Chen", "address1": "1 Main St", "city": "Portland",
                "state": "OR", "postalCode": "97201", "country": "US", "phone": ""}
        });
        let (status, body) = call(&app, "POST", "/api/v1/checkout", Some(checkout)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, Value::String("Cart is empty".into()));
    }

    #[tokio::test]
    async fn test_webhook_signature_failure_is_400() {
        let state = memory_state().with_integrations(Integrations { stripe_webhook_secret: Some("whsec_test".into()), ..Default::default() });
        let app = router(state);
        let body = json!({"id": "evt_1", "type": "payment_intent.succeeded", "data": {"object": {"id": "pi_1"}}}).to_string();
        let header = sign_stripe("whsec_other", body.as_bytes(), chrono::Utc::now().timestamp()).unwrap();
        let request = Request::builder().method("POST").uri("/api/v1/webhooks/stripe")
            .header("stripe-signature", header).body(Body::from(body)).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_discount_validation_reports_reason() {
        let app = router(memory_state());
        let (status, body) = call(&app, "POST", "/api/v1/discounts/validate", Some(json!({"code": "GHOST", "subtotal": "20"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"valid": false, "error": "Invalid discount code"}));
    }

    #[tokio::test]
    async fn test_admin_routes() {
        let app = router(memory_state());
        let (status, stats) = call(&app, "GET", "/api/v1/admin/orders/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["totalOrders"], 0);

        let (status, _) = call(&app, "GET", &format!("/api/v1/admin/orders/{}", uuid::Uuid::now_v7()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, "POST", "/api/v1/admin/categories", Some(json!({"name": "Gift Sets"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        let (_, categories) = call(&app, "GET", "/api/v1/categories", None).await;
        assert_eq!(categories[0]["slug"], "gift-sets");

        let (status, _) = call(&app, "POST", "/api/v1/admin/webhooks/printful/replay", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&app, "POST", "/api/v1/admin/webhooks/acme/replay", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
