//! Card payments through Stripe payment intents.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{rejected, to_minor_units, CaptureResult, GatewayError, PaymentGateway, PaymentRequest, PaymentSession};
use crate::config::StripeConfig;
use crate::domain::aggregates::PaymentMethod;

#[derive(Debug, Clone)]
pub struct StripeGateway {
    config: StripeConfig,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    client_secret: Option<String>,
    status: String,
}

impl StripeGateway {
    pub fn new(config: StripeConfig, timeout: Duration) -> Result<Self, GatewayError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { config, http })
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn method(&self) -> PaymentMethod { PaymentMethod::Stripe }

    async fn create_session(&self, request: &PaymentRequest) -> Result<PaymentSession, GatewayError> {
        let amount = to_minor_units(request.amount)?;
        let form = [
            ("amount", amount.to_string()),
            ("currency", request.currency.to_lowercase()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
            ("metadata[orderId]", request.order_id.to_string()),
            ("metadata[orderNumber]", request.order_number.clone()),
        ];

        let response = self
            .http
            .post(format!("{}/v1/payment_intents", self.config.api_url))
            .bearer_auth(&self.config.secret_key)
            // one intent per order even if the browser retries
            .header("Idempotency-Key", format!("intent-{}-{amount}", request.order_id))
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejected(response).await);
        }

        let intent: IntentResponse = response.json().await?;
        tracing::debug!(intent = %intent.id, status = %intent.status, "payment intent created");

        Ok(PaymentSession { client_secret: intent.client_secret, approval_id: None, transaction_id: intent.id })
    }

    /// Intents capture automatically; this reads back the intent state.
    async fn capture(&self, transaction_id: &str) -> Result<CaptureResult, GatewayError> {
        let response = self
            .http
            .get(format!("{}/v1/payment_intents/{transaction_id}", self.config.api_url))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejected(response).await);
        }

        let intent: IntentResponse = response.json().await?;
        Ok(CaptureResult { completed: intent.status == "succeeded", transaction_id: intent.id, status: intent.status })
    }
}
