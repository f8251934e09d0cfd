//! Category Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::product::{slugify, ProductError};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn create(name: &str, description: Option<String>, parent_id: Option<Uuid>, sort_order: i32, now: DateTime<Utc>) -> Result<Self, ProductError> {
        let slug = slugify(name);
        if slug.is_empty() { return Err(ProductError::MissingName); }
        Ok(Self { id: Uuid::now_v7(), name: name.trim().to_string(), slug, description, parent_id, sort_order, is_active: true, created_at: now })
    }
}
