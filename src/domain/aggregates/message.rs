//! Contact messages left from the storefront

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::{Email, OrderNumber};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus { #[default] New, Read, Replied, Resolved }

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Read => "read",
            Self::Replied => "replied",
            Self::Resolved => "resolved",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactMessage {
    pub id: Uuid,
    pub name: String,
    pub email: Email,
    pub subject: String,
    pub message: String,
    pub order_number: Option<OrderNumber>,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
}

impl ContactMessage {
    pub fn new(name: &str, email: Email, subject: &str, message: &str, order_number: Option<OrderNumber>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(), name: name.trim().to_string(), email, subject: subject.trim().to_string(),
            message: message.trim().to_string(), order_number, status: MessageStatus::New, created_at: now,
        }
    }
}
