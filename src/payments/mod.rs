//! Payment gateways.
//!
//! A gateway opens a payment session sized to an order total and later
//! confirms the charge. Client-side success callbacks are only hints; an
//! order is marked paid from a verified webhook or a server-side capture.

use async_trait::async_trait;
use mockall::automock;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::PaymentMethod;

mod paypal;
mod stripe;

pub use paypal::PaypalGateway;
pub use stripe::StripeGateway;

#[derive(Clone, Debug, PartialEq)]
pub struct PaymentRequest {
    pub amount: Decimal,
    pub currency: String,
    pub order_id: Uuid,
    pub order_number: String,
}

/// Handed to the browser SDK: `{clientSecret | approvalId, transactionId}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<String>,
    pub transaction_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureResult {
    pub transaction_id: String,
    /// Provider status string, `COMPLETED` / `succeeded` when money moved.
    pub status: String,
    pub completed: bool,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment gateway not configured")]
    NotConfigured,
    #[error("amount must be positive")]
    InvalidAmount,
    #[error("gateway rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("gateway timed out")]
    Timeout,
    #[error("gateway transport error: {0}")]
    Transport(String),
    #[error("unexpected gateway response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for GatewayError {
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

#[automock]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn method(&self) -> PaymentMethod;

    /// Opens a session for `request.amount`.
    async fn create_session(&self, request: &PaymentRequest) -> Result<PaymentSession, GatewayError>;

    /// Confirms the charge server-side.
    async fn capture(&self, transaction_id: &str) -> Result<CaptureResult, GatewayError>;
}

/// Amount in the currency's minor unit (cents), half-cents rounded up.
pub fn to_minor_units(amount: Decimal) -> Result<i64, GatewayError> {
    let cents = (amount * Decimal::ONE_HUNDRED).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    match cents.to_i64() {
        Some(c) if c > 0 => Ok(c),
        _ => Err(GatewayError::InvalidAmount),
    }
}

/// Two-decimal string amount, as wallet APIs expect.
pub fn to_decimal_string(amount: Decimal) -> Result<String, GatewayError> {
    if amount <= Decimal::ZERO { return Err(GatewayError::InvalidAmount); }
    Ok(format!("{:.2}", amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)))
}

async fn rejected(response: reqwest::Response) -> GatewayError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    GatewayError::Rejected { status, message }
}
