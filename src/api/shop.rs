//! Shopper-facing handlers: catalog, cart, checkout, payments, webhooks.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::ApiResult;
use crate::domain::aggregates::{Category, DiscountValidation, Order, PaymentMethod, PublicProduct, TrackingView};
use crate::domain::value_objects::Email;
use crate::payments::PaymentSession;
use crate::services::cart::CartView;
use crate::services::messages::ContactRequest;
use crate::services::orders::CheckoutRequest;
use crate::services::payments::CaptureOutcome;
use crate::services::webhooks::WebhookAck;
use crate::services::{cart, catalog, discounts, messages, orders, payments, webhooks, AppState};
use crate::store::ProductFilter;
use crate::StorefrontError;

#[derive(Debug, Deserialize)]
pub struct CartParams {
    #[serde(alias = "userId")]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    #[validate(length(min = 1))]
    pub variant_id: String,
    #[validate(range(min = 1, max = 99))]
    pub quantity: u32,
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCartItemRequest {
    pub quantity: i64,
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ApplyDiscountRequest {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    pub email: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MergeCartRequest {
    #[validate(length(min = 1))]
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ValidateDiscountRequest {
    pub code: String,
    pub email: Option<String>,
    pub subtotal: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMetadata {
    pub order_id: Uuid,
}

/// Body of both session-creation routes; the amount is checked against the order.
#[derive(Debug, Deserialize)]
pub struct PaymentSessionRequest {
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub metadata: PaymentMetadata,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    #[validate(length(min = 1))]
    pub paypal_order_id: String,
    pub order_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackRequest {
    pub order_number: String,
    pub email: String,
}

/// Parses an optional shopper email; a blank value counts as absent.
fn optional_email(email: Option<&str>) -> Result<Option<Email>, StorefrontError> {
    match email.map(str::trim).filter(|e| !e.is_empty()) {
        Some(e) => Email::new(e).map(Some).map_err(|e| StorefrontError::validation(e.to_string())),
        None => Ok(None),
    }
}

pub async fn list_products(State(s): State<AppState>, Query(filter): Query<ProductFilter>) -> ApiResult<Json<Vec<PublicProduct>>> {
    Ok(Json(catalog::list_public(&s, filter).await?))
}

pub async fn get_product(State(s): State<AppState>, Path(slug): Path<String>) -> ApiResult<Json<PublicProduct>> {
    Ok(Json(catalog::get_public_by_slug(&s, &slug).await?))
}

pub async fn list_categories(State(s): State<AppState>) -> ApiResult<Json<Vec<Category>>> {
    Ok(Json(catalog::list_categories(&s).await?))
}

pub async fn get_cart(State(s): State<AppState>, Path(session): Path<String>, Query(p): Query<CartParams>) -> ApiResult<Json<CartView>> {
    Ok(Json(cart::get(&s, &session, p.user_id.as_deref()).await?))
}

pub async fn add_to_cart(State(s): State<AppState>, Path(session): Path<String>, Json(r): Json<AddToCartRequest>) -> ApiResult<Json<CartView>> {
    r.validate().map_err(StorefrontError::from)?;
    Ok(Json(cart::add_item(&s, &session, r.user_id.as_deref(), r.product_id, &r.variant_id, r.quantity).await?))
}

pub async fn update_cart_item(State(s): State<AppState>, Path((session, id)): Path<(String, Uuid)>, Json(r): Json<UpdateCartItemRequest>) -> ApiResult<Json<CartView>> {
    Ok(Json(cart::update_quantity(&s, &session, r.user_id.as_deref(), id, r.quantity).await?))
}

pub async fn remove_cart_item(State(s): State<AppState>, Path((session, id)): Path<(String, Uuid)>, Query(p): Query<CartParams>) -> ApiResult<Json<CartView>> {
    Ok(Json(cart::remove_item(&s, &session, p.user_id.as_deref(), id).await?))
}

pub async fn apply_discount(State(s): State<AppState>, Path(session): Path<String>, Json(r): Json<ApplyDiscountRequest>) -> ApiResult<Json<CartView>> {
    r.validate().map_err(StorefrontError::from)?;
    let email = optional_email(r.email.as_deref())?;
    Ok(Json(cart::apply_discount(&s, &session, r.user_id.as_deref(), &r.code, email.as_ref()).await?))
}

pub async fn remove_discount(State(s): State<AppState>, Path(session): Path<String>, Query(p): Query<CartParams>) -> ApiResult<Json<CartView>> {
    Ok(Json(cart::remove_discount(&s, &session, p.user_id.as_deref()).await?))
}

pub async fn clear_cart(State(s): State<AppState>, Path(session): Path<String>, Query(p): Query<CartParams>) -> ApiResult<Json<CartView>> {
    Ok(Json(cart::clear(&s, &session, p.user_id.as_deref()).await?))
}

pub async fn merge_cart(State(s): State<AppState>, Path(session): Path<String>, Json(r): Json<MergeCartRequest>) -> ApiResult<Json<CartView>> {
    r.validate().map_err(StorefrontError::from)?;
    Ok(Json(cart::merge(&s, &session, &r.user_id).await?))
}

/// Always 200; a rejected code is reported in the body.
pub async fn validate_discount(State(s): State<AppState>, Json(r): Json<ValidateDiscountRequest>) -> ApiResult<Json<DiscountValidation>> {
    let email = optional_email(r.email.as_deref())?;
    Ok(Json(discounts::check(&s, &r.code, email.as_ref(), r.subtotal).await?.into()))
}

pub async fn checkout(State(s): State<AppState>, Json(r): Json<CheckoutRequest>) -> ApiResult<(StatusCode, Json<Order>)> {
    Ok((StatusCode::CREATED, Json(orders::checkout(&s, r).await?)))
}

pub async fn create_stripe_intent(State(s): State<AppState>, Json(r): Json<PaymentSessionRequest>) -> ApiResult<Json<PaymentSession>> {
    let session = payments::create_session(&s, PaymentMethod::Stripe, r.metadata.order_id, r.amount, r.currency.as_deref()).await?;
    Ok(Json(session))
}

pub async fn create_paypal_order(State(s): State<AppState>, Json(r): Json<PaymentSessionRequest>) -> ApiResult<Json<PaymentSession>> {
    let session = payments::create_session(&s, PaymentMethod::Paypal, r.metadata.order_id, r.amount, r.currency.as_deref()).await?;
    Ok(Json(session))
}

pub async fn capture_paypal(State(s): State<AppState>, Json(r): Json<CaptureRequest>) -> ApiResult<Json<CaptureOutcome>> {
    r.validate().map_err(StorefrontError::from)?;
    Ok(Json(payments::capture_paypal(&s, &r.paypal_order_id, r.order_id).await?))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

pub async fn stripe_webhook(State(s): State<AppState>, headers: HeaderMap, body: Bytes) -> ApiResult<Json<WebhookAck>> {
    Ok(Json(webhooks::handle_stripe(&s, header(&headers, "stripe-signature"), &body).await?))
}

pub async fn printful_webhook(State(s): State<AppState>, headers: HeaderMap, body: Bytes) -> ApiResult<Json<WebhookAck>> {
    Ok(Json(webhooks::handle_printful(&s, header(&headers, "x-pf-signature"), &body).await?))
}

pub async fn track_order(State(s): State<AppState>, Json(r): Json<TrackRequest>) -> ApiResult<Json<TrackingView>> {
    Ok(Json(orders::track(&s, &r.order_number, &r.email).await?))
}

pub async fn contact(State(s): State<AppState>, Json(r): Json<ContactRequest>) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let message = messages::create(&s, r).await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({"success": true, "id": message.id}))))
}
