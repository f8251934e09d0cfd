//! Resend email API.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use super::{Notifier, NotifyError, OutboundEmail};
use crate::config::{EmailConfig, RESEND_API_URL};

#[derive(Debug, Clone)]
pub struct ResendMailer {
    config: EmailConfig,
    api_url: String,
    http: Client,
}

impl ResendMailer {
    pub fn new(config: EmailConfig, timeout: Duration) -> Result<Self, NotifyError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { config, api_url: RESEND_API_URL.to_string(), http })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Applies the staging redirect: every message goes to the test recipient.
    fn addressed(&self, email: &OutboundEmail) -> (String, String) {
        match &self.config.test_recipient {
            Some(test) => {
                tracing::info!(original = %email.to, redirected = %test, "redirecting email to test recipient");
                (test.clone(), format!("[TEST] {}", email.subject))
            }
            None => (email.to.clone(), email.subject.clone()),
        }
    }
}

#[async_trait]
impl Notifier for ResendMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<(), NotifyError> {
        let api_key = self.config.resend_api_key.as_deref().ok_or(NotifyError::NotConfigured)?;
        let (to, subject) = self.addressed(email);

        let response = self
            .http
            .post(format!("{}/emails", self.api_url))
            .bearer_auth(api_key)
            .json(&json!({ "from": self.config.from, "to": [to], "subject": subject, "text": email.text }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected { status, message });
        }

        tracing::info!(to = %to, subject = %subject, "email sent");
        Ok(())
    }
}
