//! Printful REST client.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{PrintOnDemandClient, Shipment, VendorError, VendorOrder, VendorOrderRequest, VendorOrderStatus};
use crate::config::PrintfulConfig;

#[derive(Debug, Clone)]
pub struct PrintfulClient {
    config: PrintfulConfig,
    http: Client,
}

/// Every Printful response is wrapped as `{code, result}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct OrderResult {
    id: u64,
    status: String,
    #[serde(default)]
    shipments: Vec<Shipment>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl PrintfulClient {
    pub fn new(config: PrintfulConfig, timeout: Duration) -> Result<Self, VendorError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { config, http })
    }

    async fn rejected(response: reqwest::Response) -> VendorError {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|b| b.error.map(|e| e.message).or_else(|| b.result.and_then(|r| r.as_str().map(str::to_string))))
            .unwrap_or(text);
        VendorError::Rejected { status, message }
    }
}

#[async_trait]
impl PrintOnDemandClient for PrintfulClient {
    async fn create_order(&self, request: &VendorOrderRequest) -> Result<VendorOrder, VendorError> {
        let response = self
            .http
            .post(format!("{}/orders", self.config.api_url))
            .query(&[("confirm", "true")])
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }

        let body: Envelope<OrderResult> = response.json().await?;
        Ok(VendorOrder { id: body.result.id.to_string(), status: body.result.status })
    }

    async fn get_order(&self, vendor_order_id: &str) -> Result<VendorOrderStatus, VendorError> {
        let response = self
            .http
            .get(format!("{}/orders/{vendor_order_id}", self.config.api_url))
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }

        let body: Envelope<OrderResult> = response.json().await?;
        Ok(VendorOrderStatus { id: body.result.id.to_string(), status: body.result.status, shipments: body.result.shipments })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vendors::{PackingSlip, Recipient, VendorLineItem};
    use axum::{extract::Path, http::StatusCode, routing::{get, post}, Json, Router};
    use serde_json::json;

    async fn fake_printful() -> String {
        let app = Router::new()
            .route("/orders", post(|Json(body): Json<serde_json::Value>| async move {
                if body["items"][0]["sync_variant_id"] == 0 {
                    return (StatusCode::BAD_REQUEST, Json(json!({"code": 400, "result": "Item 0: Variant not found"})));
                }
                (StatusCode::OK, Json(json!({"code": 200, "result": {"id": 9001, "status": "pending", "external_id": body["external_id"]}})))
            }))
            .route("/orders/:id", get(|Path(id): Path<String>| async move {
                Json(json!({"code": 200, "result": {"id": id.parse::<u64>().unwrap(), "status": "fulfilled", "shipments": [
                    {"carrier": "USPS", "tracking_number": "9400", "tracking_url": "https://t/9400"}
                ]}}))
            }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    fn client(api_url: String) -> PrintfulClient {
        PrintfulClient::new(PrintfulConfig { api_key: "k".into(), webhook_secret: None, api_url }, Duration::from_secs(5)).unwrap()
    }

    fn request(sync_variant_id: u64) -> VendorOrderRequest {
        VendorOrderRequest {
            external_id: "DB-ABC-1234".into(),
            recipient: Recipient {
                name: "Mei Chen".into(), address1: "1 Bear Lane".into(), address2: None, city: "Portland".into(),
                state_code: "OR".into(), country_code: "US".into(), zip: "97201".into(), phone: String::new(), email: "mei@example.com".into(),
            },
            items: vec![VendorLineItem { sync_variant_id, quantity: 1, retail_price: "24.99".into(), name: "Mug".into() }],
            gift: None,
            packing_slip: PackingSlip { email: "mei@example.com".into(), message: "Thank you".into() },
        }
    }

    #[tokio::test]
    async fn test_create_and_fetch_order() {
        let c = client(fake_printful().await);
        let order = c.create_order(&request(77)).await.unwrap();
        assert_eq!(order.id, "9001");
        let status = c.get_order(&order.id).await.unwrap();
        assert_eq!(status.shipments[0].tracking_number, "9400");
    }

    #[tokio::test]
    async fn test_rejection_carries_vendor_message() {
        let c = client(fake_printful().await);
        let err = c.create_order(&request(0)).await.unwrap_err();
        assert!(err.is_definitive());
        assert!(matches!(err, VendorError::Rejected { status: 400, ref message } if message == "Item 0: Variant not found"));
    }

    #[tokio::test]
    async fn test_unreachable_vendor_is_not_definitive() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = client(format!("http://{addr}")).create_order(&request(77)).await.unwrap_err();
        assert!(!err.is_definitive());
    }
}
