//! Product Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::Sku;

/// Who produces and ships a line item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentType {
    /// Print-on-demand vendor with an order API.
    Printful,
    /// Dropship vendor handled by an admin from a notification email.
    #[serde(alias = "aliexpress", alias = "cjdropshipping")]
    Dropship,
    Manual,
}

impl FulfillmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Printful => "printful",
            Self::Dropship => "dropship",
            Self::Manual => "manual",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub base_price: Decimal,
    pub compare_at_price: Option<Decimal>,
    /// Never shown to shoppers; only used for profit snapshots.
    pub cost_price: Decimal,
    pub images: Vec<String>,
    pub variants: Vec<Variant>,
    pub fulfillment_type: FulfillmentType,
    #[serde(default)]
    pub vendor_refs: VendorRefs,
    pub is_active: bool,
    pub is_featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub id: String,
    pub name: String,
    pub sku: Sku,
    pub price: Decimal,
    pub cost_price: Decimal,
    /// `None` means made on demand, no stock limit.
    pub stock: Option<u32>,
    pub image: Option<String>,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// Vendor cross-references, read only by fulfillment routing.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorRefs {
    pub printful_product_id: Option<String>,
    #[serde(default)]
    pub printful_sync_variants: Vec<SyncVariant>,
    pub dropship_product_id: Option<String>,
    pub dropship_url: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncVariant {
    pub variant_id: String,
    pub printful_variant_id: u64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub base_price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub cost_price: Decimal,
    #[serde(default)]
    pub images: Vec<String>,
    pub variants: Vec<Variant>,
    pub fulfillment_type: FulfillmentType,
    #[serde(default)]
    pub vendor_refs: VendorRefs,
    #[serde(default)]
    pub is_featured: bool,
}

/// Shopper-facing projection without cost fields or vendor references.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProduct {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub base_price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub images: Vec<String>,
    pub variants: Vec<PublicVariant>,
    pub is_featured: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicVariant {
    pub id: String,
    pub name: String,
    pub sku: Sku,
    pub price: Decimal,
    pub in_stock: bool,
    pub image: Option<String>,
    pub options: BTreeMap<String, String>,
}

/// Lower-case, dash-separated URL slug.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

impl Product {
    pub fn create(new: NewProduct, now: DateTime<Utc>) -> Result<Self, ProductError> {
        let NewProduct {
            name, slug, description, category, tags, base_price, compare_at_price, cost_price,
            images, variants, fulfillment_type, vendor_refs, is_featured,
        } = new;
        let mut product = Self {
            id: Uuid::now_v7(), slug: String::new(), name, description, category, tags,
            base_price, compare_at_price, cost_price, images, variants, fulfillment_type, vendor_refs,
            is_active: true, is_featured, created_at: now, updated_at: now,
        };
        product.slug = slug.map(|s| slugify(&s)).unwrap_or_else(|| slugify(&product.name));
        product.check()?;
        Ok(product)
    }

    /// Replaces the editable fields, keeping identity and timestamps.
    pub fn update(&mut self, new: NewProduct, now: DateTime<Utc>) -> Result<(), ProductError> {
        let mut updated = Self::create(new, now)?;
        updated.id = self.id;
        updated.created_at = self.created_at;
        updated.is_active = self.is_active;
        *self = updated;
        Ok(())
    }

    /// Soft delete; historical orders keep referencing the product.
    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.is_active = false;
        self.updated_at = now;
    }

    pub fn variant(&self, variant_id: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }

    /// Resolves a variant a shopper wants to buy `quantity` of.
    pub fn purchasable_variant(&self, variant_id: &str, quantity: u32) -> Result<&Variant, ProductError> {
        if !self.is_active { return Err(ProductError::Inactive(self.name.clone())); }
        let variant = self.variant(variant_id).ok_or_else(|| ProductError::UnknownVariant(variant_id.to_string()))?;
        match variant.stock {
            Some(available) if quantity > available => Err(ProductError::InsufficientStock { sku: variant.sku.to_string(), available }),
            _ => Ok(variant),
        }
    }

    /// Vendor variant id from the sync mapping, falling back to a `PF-<n>` SKU.
    pub fn printful_variant_id(&self, variant_id: &str) -> Option<u64> {
        self.vendor_refs.printful_sync_variants.iter()
            .find(|s| s.variant_id == variant_id)
            .map(|s| s.printful_variant_id)
            .or_else(|| self.variant(variant_id).and_then(|v| v.sku.printful_variant_id()))
    }

    pub fn public_view(&self) -> PublicProduct {
        PublicProduct {
            id: self.id, name: self.name.clone(), slug: self.slug.clone(), description: self.description.clone(),
            category: self.category.clone(), tags: self.tags.clone(), base_price: self.base_price,
            compare_at_price: self.compare_at_price, images: self.images.clone(), is_featured: self.is_featured,
            variants: self.variants.iter().map(|v| PublicVariant {
                id: v.id.clone(), name: v.name.clone(), sku: v.sku.clone(), price: v.price,
                in_stock: v.stock.map_or(true, |s| s > 0), image: v.image.clone(), options: v.options.clone(),
            }).collect(),
        }
    }

    fn check(&self) -> Result<(), ProductError> {
        if self.name.trim().is_empty() { return Err(ProductError::MissingName); }
        if self.slug.is_empty() { return Err(ProductError::MissingName); }
        if self.variants.is_empty() { return Err(ProductError::NoVariants); }
        if self.base_price.is_sign_negative() || self.cost_price.is_sign_negative() {
            return Err(ProductError::NegativePrice);
        }
        let mut seen = HashSet::new();
        for v in &self.variants {
            if v.price.is_sign_negative() || v.cost_price.is_sign_negative() { return Err(ProductError::NegativePrice); }
            if !seen.insert(v.id.as_str()) { return Err(ProductError::DuplicateVariant(v.id.clone())); }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductError {
    #[error("product name is required")]
    MissingName,
    #[error("product needs at least one variant")]
    NoVariants,
    #[error("prices must not be negative")]
    NegativePrice,
    #[error("duplicate variant id {0}")]
    DuplicateVariant(String),
    #[error("unknown variant {0}")]
    UnknownVariant(String),
    #[error("{0} is no longer available")]
    Inactive(String),
    #[error("only {available} left of {sku}")]
    InsufficientStock { sku: String, available: u32 },
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    pub(crate) fn variant(id: &str, sku: &str, price: Decimal, cost: Decimal) -> Variant {
        Variant { id: id.into(), name: id.into(), sku: Sku::new(sku).unwrap(), price, cost_price: cost, stock: None, image: None, options: BTreeMap::new() }
    }

    pub(crate) fn new_product(name: &str, fulfillment_type: FulfillmentType, variants: Vec<Variant>) -> NewProduct {
        NewProduct {
            name: name.into(), slug: None, description: String::new(), category: "plushies".into(), tags: vec![],
            base_price: variants.first().map(|v| v.price).unwrap_or_default(), compare_at_price: None,
            cost_price: variants.first().map(|v| v.cost_price).unwrap_or_default(), images: vec![], variants,
            fulfillment_type, vendor_refs: VendorRefs::default(), is_featured: false,
        }
    }

    #[test]
    fn test_product_create() {
        let p = Product::create(new_product("Bubu & Dudu Plush Set", FulfillmentType::Manual, vec![variant("v1", "DB-PLUSH-001", dec!(34.99), dec!(12))]), Utc::now()).unwrap();
        assert_eq!(p.slug, "bubu-dudu-plush-set");
        assert!(p.is_active);
    }

    #[test]
    fn test_rejects_duplicate_variants() {
        let err = Product::create(new_product("Mug", FulfillmentType::Printful, vec![
            variant("v1", "PF-1", dec!(10), dec!(4)),
            variant("v1", "PF-2", dec!(10), dec!(4)),
        ]), Utc::now()).unwrap_err();
        assert_eq!(err, ProductError::DuplicateVariant("v1".into()));
    }

    #[test]
    fn test_stock() {
        let mut v = variant("v1", "KEY-1", dec!(12.99), dec!(3));
        v.stock = Some(2);
        let p = Product::create(new_product("Keychain", FulfillmentType::Dropship, vec![v]), Utc::now()).unwrap();
        assert!(p.purchasable_variant("v1", 2).is_ok());
        assert!(matches!(p.purchasable_variant("v1", 3), Err(ProductError::InsufficientStock { available: 2, .. })));
        assert!(matches!(p.purchasable_variant("nope", 1), Err(ProductError::UnknownVariant(_))));
    }

    #[test]
    fn test_deactivated_product_is_not_purchasable() {
        let mut p = Product::create(new_product("Hoodie", FulfillmentType::Printful, vec![variant("m", "PF-77", dec!(45), dec!(20))]), Utc::now()).unwrap();
        p.deactivate(Utc::now());
        assert!(matches!(p.purchasable_variant("m", 1), Err(ProductError::Inactive(_))));
    }

    #[test]
    fn test_printful_variant_lookup() {
        let mut new = new_product("Hoodie", FulfillmentType::Printful, vec![
            variant("m", "PF-77", dec!(45), dec!(20)),
            variant("l", "HOOD-L", dec!(45), dec!(20)),
        ]);
        new.vendor_refs.printful_sync_variants.push(SyncVariant { variant_id: "l".into(), printful_variant_id: 9001 });
        let p = Product::create(new, Utc::now()).unwrap();
        assert_eq!(p.printful_variant_id("m"), Some(77));
        assert_eq!(p.printful_variant_id("l"), Some(9001));
    }

    #[test]
    fn test_public_view_hides_cost() {
        let p = Product::create(new_product("Mug", FulfillmentType::Printful, vec![variant("v1", "PF-1", dec!(10), dec!(4))]), Utc::now()).unwrap();
        let json = serde_json::to_value(p.public_view()).unwrap();
        assert!(json.get("costPrice").is_none());
        assert!(json["variants"][0].get("costPrice").is_none());
    }
}
