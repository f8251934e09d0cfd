//! Wallet payments through PayPal orders (`intent=CAPTURE`).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{rejected, to_decimal_string, CaptureResult, GatewayError, PaymentGateway, PaymentRequest, PaymentSession};
use crate::config::PaypalConfig;
use crate::domain::aggregates::PaymentMethod;

#[derive(Debug, Clone)]
pub struct PaypalGateway {
    config: PaypalConfig,
    http: Client,
    return_url: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    status: String,
}

impl PaypalGateway {
    pub fn new(config: PaypalConfig, app_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { config, http, return_url: app_url.trim_end_matches('/').to_string() })
    }

    async fn access_token(&self) -> Result<String, GatewayError> {
        let response = self
            .http
            .post(format!("{}/v1/oauth2/token", self.config.api_url))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejected(response).await);
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl PaymentGateway for PaypalGateway {
    fn method(&self) -> PaymentMethod { PaymentMethod::Paypal }

    async fn create_session(&self, request: &PaymentRequest) -> Result<PaymentSession, GatewayError> {
        let value = to_decimal_string(request.amount)?;
        let token = self.access_token().await?;

        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": request.order_number,
                "custom_id": request.order_id.to_string(),
                "amount": { "currency_code": request.currency.to_uppercase(), "value": value },
            }],
            "application_context": {
                "user_action": "PAY_NOW",
                "return_url": format!("{}/checkout/success", self.return_url),
                "cancel_url": format!("{}/checkout", self.return_url),
            },
        });

        let response = self
            .http
            .post(format!("{}/v2/checkout/orders", self.config.api_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejected(response).await);
        }

        let order: OrderResponse = response.json().await?;
        Ok(PaymentSession { client_secret: None, approval_id: Some(order.id.clone()), transaction_id: order.id })
    }

    async fn capture(&self, transaction_id: &str) -> Result<CaptureResult, GatewayError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!("{}/v2/checkout/orders/{transaction_id}/capture", self.config.api_url))
            .bearer_auth(token)
            .json(&json!({}))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejected(response).await);
        }

        let order: OrderResponse = response.json().await?;
        Ok(CaptureResult { completed: order.status == "COMPLETED", transaction_id: order.id, status: order.status })
    }
}
