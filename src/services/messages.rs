//! Contact form messages.

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::AppState;
use crate::domain::aggregates::{ContactMessage, MessageStatus};
use crate::domain::value_objects::{Email, OrderNumber};
use crate::notify::messages;
use crate::{Result, StorefrontError};

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ContactRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 200))]
    pub subject: String,
    #[validate(length(min = 1, max = 5000))]
    pub message: String,
    pub order_number: Option<String>,
}

/// Stores the message, then alerts the admin. The alert is best effort.
pub async fn create(state: &AppState, request: ContactRequest) -> Result<ContactMessage> {
    request.validate()?;
    if request.name.trim().is_empty() || request.subject.trim().is_empty() || request.message.trim().is_empty() {
        return Err(StorefrontError::validation("Name, subject and message are required"));
    }
    let email = Email::new(&request.email).map_err(|e| StorefrontError::validation(e.to_string()))?;
    let order_number = request.order_number.as_deref().map(str::trim).filter(|n| !n.is_empty()).map(OrderNumber::parse);
    let message = ContactMessage::new(&request.name, email, &request.subject, &request.message, order_number, Utc::now());
    state.store.insert_message(&message).await?;
    tracing::info!(message_id = %message.id, "contact message received");

    match state.integrations.admin_email.as_deref() {
        Some(admin) => {
            if let Err(e) = state.send_email(&messages::contact_alert(&message, admin)).await {
                tracing::warn!(message_id = %message.id, error = %e, "contact alert not sent");
            }
        }
        None => tracing::warn!(message_id = %message.id, "no admin email configured for contact alerts"),
    }
    Ok(message)
}

pub async fn list(state: &AppState, status: Option<MessageStatus>) -> Result<Vec<ContactMessage>> {
    Ok(state.store.list_messages(status).await?)
}

pub async fn set_status(state: &AppState, id: Uuid, status: MessageStatus) -> Result<ContactMessage> {
    Ok(state.store.set_message_status(id, status).await?)
}
