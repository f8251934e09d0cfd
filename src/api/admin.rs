//! Back-office handlers under `/api/v1/admin`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::ApiResult;
use crate::domain::aggregates::{
    Category, ContactMessage, DiscountCode, FulfillmentStatus, MessageStatus, NewDiscount, NewProduct, Order, OrderStatus,
    Product, TrackingUpdate,
};
use crate::services::fulfillment::FulfillmentSummary;
use crate::services::orders::OrderStats;
use crate::services::{catalog, discounts, fulfillment, messages, orders, webhooks, AppState};
use crate::store::{OrderFilter, ProductFilter};
use crate::StorefrontError;

#[derive(Debug, Deserialize)]
pub struct StatusRequest<S> {
    pub status: S,
}

#[derive(Debug, Deserialize)]
pub struct ItemUpdateRequest {
    pub status: FulfillmentStatus,
    #[serde(flatten)]
    pub tracking: TrackingUpdate,
}

#[derive(Debug, Deserialize, Validate)]
pub struct NoteRequest {
    #[validate(length(min = 1, max = 2000))]
    pub note: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    pub order_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCategoryRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub sort_order: i32,
}

#[derive(Debug, Deserialize)]
pub struct MessageParams {
    pub status: Option<MessageStatus>,
}

pub async fn list_orders(State(s): State<AppState>, Query(filter): Query<OrderFilter>) -> ApiResult<Json<Vec<Order>>> {
    Ok(Json(orders::list(&s, &filter).await?))
}

pub async fn order_stats(State(s): State<AppState>) -> ApiResult<Json<OrderStats>> {
    Ok(Json(orders::stats(&s).await?))
}

pub async fn get_order(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Order>> {
    Ok(Json(orders::get(&s, id).await?))
}

pub async fn set_order_status(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<StatusRequest<OrderStatus>>) -> ApiResult<Json<Order>> {
    Ok(Json(orders::set_status(&s, id, r.status).await?))
}

pub async fn update_order_item(State(s): State<AppState>, Path((id, index)): Path<(Uuid, usize)>, Json(r): Json<ItemUpdateRequest>) -> ApiResult<Json<Order>> {
    Ok(Json(orders::update_item(&s, id, index, r.status, r.tracking).await?))
}

pub async fn add_order_note(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<NoteRequest>) -> ApiResult<Json<Order>> {
    r.validate().map_err(StorefrontError::from)?;
    Ok(Json(orders::add_note(&s, id, &r.note).await?))
}

pub async fn sync_tracking(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Order>> {
    Ok(Json(fulfillment::sync_tracking(&s, id).await?))
}

/// Manual (re)trigger of the router; only pending or failed items are sent.
pub async fn process_fulfillment(State(s): State<AppState>, Json(r): Json<ProcessRequest>) -> ApiResult<Json<FulfillmentSummary>> {
    Ok(Json(fulfillment::process_order(&s, r.order_id).await?))
}

pub async fn list_products(State(s): State<AppState>, Query(filter): Query<ProductFilter>) -> ApiResult<Json<Vec<Product>>> {
    Ok(Json(catalog::list_admin(&s, filter).await?))
}

pub async fn create_product(State(s): State<AppState>, Json(r): Json<NewProduct>) -> ApiResult<(StatusCode, Json<Product>)> {
    Ok((StatusCode::CREATED, Json(catalog::create_product(&s, r).await?)))
}

pub async fn update_product(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<NewProduct>) -> ApiResult<Json<Product>> {
    Ok(Json(catalog::update_product(&s, id, r).await?))
}

pub async fn delete_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    catalog::deactivate_product(&s, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_category(State(s): State<AppState>, Json(r): Json<CreateCategoryRequest>) -> ApiResult<(StatusCode, Json<Category>)> {
    r.validate().map_err(StorefrontError::from)?;
    let category = catalog::create_category(&s, &r.name, r.description, r.parent_id, r.sort_order).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn list_discounts(State(s): State<AppState>) -> ApiResult<Json<Vec<DiscountCode>>> {
    Ok(Json(discounts::list(&s).await?))
}

pub async fn create_discount(State(s): State<AppState>, Json(r): Json<NewDiscount>) -> ApiResult<(StatusCode, Json<DiscountCode>)> {
    Ok((StatusCode::CREATED, Json(discounts::create(&s, r).await?)))
}

pub async fn deactivate_discount(State(s): State<AppState>, Path(code): Path<String>) -> ApiResult<Json<DiscountCode>> {
    Ok(Json(discounts::deactivate(&s, &code).await?))
}

pub async fn list_messages(State(s): State<AppState>, Query(p): Query<MessageParams>) -> ApiResult<Json<Vec<ContactMessage>>> {
    Ok(Json(messages::list(&s, p.status).await?))
}

pub async fn set_message_status(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<StatusRequest<MessageStatus>>) -> ApiResult<Json<ContactMessage>> {
    Ok(Json(messages::set_status(&s, id, r.status).await?))
}

pub async fn replay_webhooks(State(s): State<AppState>, Path(provider): Path<String>) -> ApiResult<Json<serde_json::Value>> {
    let replayed = webhooks::replay_pending(&s, &provider).await?;
    Ok(Json(serde_json::json!({"provider": provider, "replayed": replayed})))
}
