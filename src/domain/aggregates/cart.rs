//! Cart Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::discount::DiscountKind;
use super::product::{FulfillmentType, Product, ProductError};
use crate::domain::value_objects::{CouponCode, Sku};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    id: Uuid,
    session_id: String,
    user_id: Option<String>,
    items: Vec<CartItem>,
    applied_discount: Option<AppliedDiscount>,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// A line holds no price; prices are looked up live when the cart is rendered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: String,
    pub quantity: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppliedDiscount {
    pub code: CouponCode,
    #[serde(rename = "type")]
    pub kind: DiscountKind,
    pub value: Decimal,
}

/// A cart line joined with the live catalog.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedLine {
    pub line_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: String,
    pub product_name: String,
    pub variant_name: String,
    pub sku: Sku,
    pub image: Option<String>,
    pub unit_price: Decimal,
    #[serde(skip)]
    pub unit_cost: Decimal,
    pub quantity: u32,
    pub fulfillment_type: FulfillmentType,
}

/// A line whose product was deactivated, removed or sold down since it was added.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnavailableLine {
    pub line_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: String,
    pub quantity: u32,
    pub reason: String,
}

impl PricedLine {
    pub fn line_total(&self) -> Decimal { self.unit_price * Decimal::from(self.quantity) }
}

#[derive(Clone, Debug)]
pub struct ShippingPolicy {
    pub free_shipping_threshold: Decimal,
    pub standard_shipping: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSummary {
    pub item_count: u32,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

impl Cart {
    pub fn new(session_id: impl Into<String>, user_id: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(), session_id: session_id.into(), user_id, items: vec![],
            applied_discount: None, version: 0, created_at: now, updated_at: now,
        }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn session_id(&self) -> &str { &self.session_id }
    pub fn user_id(&self) -> Option<&str> { self.user_id.as_deref() }
    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn applied_discount(&self) -> Option<&AppliedDiscount> { self.applied_discount.as_ref() }
    pub fn version(&self) -> u64 { self.version }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    /// Adds `quantity` units, folding into an existing (product, variant) line.
    pub fn add_item(&mut self, product_id: Uuid, variant_id: &str, quantity: u32, now: DateTime<Utc>) -> Result<&CartItem, CartError> {
        if quantity == 0 { return Err(CartError::InvalidQuantity); }
        let index = match self.items.iter().position(|i| i.product_id == product_id && i.variant_id == variant_id) {
            Some(index) => {
                let line = &mut self.items[index];
                line.quantity = line.quantity.checked_add(quantity).ok_or(CartError::InvalidQuantity)?;
                index
            }
            None => {
                self.items.push(CartItem { id: Uuid::now_v7(), product_id, variant_id: variant_id.to_string(), quantity });
                self.items.len() - 1
            }
        };
        self.touch(now);
        Ok(&self.items[index])
    }

    /// Sets a line's quantity; zero or less removes the line.
    pub fn update_quantity(&mut self, line_id: Uuid, quantity: i64, now: DateTime<Utc>) -> Result<(), CartError> {
        if quantity <= 0 { return self.remove_item(line_id, now); }
        let quantity = u32::try_from(quantity).map_err(|_| CartError::InvalidQuantity)?;
        let item = self.items.iter_mut().find(|i| i.id == line_id).ok_or(CartError::ItemNotFound)?;
        item.quantity = quantity;
        self.touch(now);
        Ok(())
    }

    pub fn remove_item(&mut self, line_id: Uuid, now: DateTime<Utc>) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| i.id != line_id);
        if self.items.len() == before { return Err(CartError::ItemNotFound); }
        self.touch(now);
        Ok(())
    }

    /// Replaces any previously applied discount.
    pub fn apply_discount(&mut self, discount: AppliedDiscount, now: DateTime<Utc>) {
        self.applied_discount = Some(discount);
        self.touch(now);
    }

    pub fn remove_discount(&mut self, now: DateTime<Utc>) {
        self.applied_discount = None;
        self.touch(now);
    }

    pub fn clear(&mut self, now: DateTime<Utc>) {
        self.items.clear();
        self.applied_discount = None;
        self.touch(now);
    }

    pub fn assign_user(&mut self, user_id: &str, now: DateTime<Utc>) {
        self.user_id = Some(user_id.to_string());
        self.touch(now);
    }

    /// Unions a guest cart's lines into this one, summing matching pairs.
    pub fn merge(&mut self, guest: &Cart, now: DateTime<Utc>) {
        for line in &guest.items {
            match self.items.iter_mut().find(|i| i.product_id == line.product_id && i.variant_id == line.variant_id) {
                Some(existing) => existing.quantity = existing.quantity.saturating_add(line.quantity),
                None => self.items.push(line.clone()),
            }
        }
        if self.applied_discount.is_none() {
            self.applied_discount = guest.applied_discount.clone();
        }
        self.touch(now);
    }

    /// Joins every line with the current catalog; any line that cannot be bought fails the whole cart.
    pub fn price<'a, F>(&self, lookup: F) -> Result<Vec<PricedLine>, CartError>
    where
        F: Fn(&Uuid) -> Option<&'a Product>,
    {
        self.items.iter().map(|line| price_line(line, &lookup)).collect()
    }

    /// Like [`Cart::price`], but lines that can no longer be bought are set aside instead.
    pub fn price_available<'a, F>(&self, lookup: F) -> (Vec<PricedLine>, Vec<UnavailableLine>)
    where
        F: Fn(&Uuid) -> Option<&'a Product>,
    {
        let mut priced = Vec::with_capacity(self.items.len());
        let mut unavailable = Vec::new();
        for line in &self.items {
            match price_line(line, &lookup) {
                Ok(p) => priced.push(p),
                Err(e) => unavailable.push(UnavailableLine {
                    line_id: line.id,
                    product_id: line.product_id,
                    variant_id: line.variant_id.clone(),
                    quantity: line.quantity,
                    reason: e.to_string(),
                }),
            }
        }
        (priced, unavailable)
    }

    /// Derived totals; nothing here is stored.
    pub fn summary(&self, lines: &[PricedLine], policy: &ShippingPolicy) -> CartSummary {
        let subtotal: Decimal = lines.iter().map(PricedLine::line_total).sum();
        let (discount_amount, free_shipping) = match &self.applied_discount {
            Some(d) => (d.kind.amount(d.value, subtotal), d.kind == DiscountKind::FreeShipping),
            None => (Decimal::ZERO, false),
        };
        let shipping = if lines.is_empty() || free_shipping || subtotal >= policy.free_shipping_threshold {
            Decimal::ZERO
        } else {
            policy.standard_shipping
        };
        CartSummary {
            item_count: lines.iter().map(|l| l.quantity).sum(),
            subtotal,
            discount_amount,
            shipping,
            total: subtotal - discount_amount + shipping,
        }
    }

    pub(crate) fn bump_version(&mut self) { self.version += 1; }

    fn touch(&mut self, now: DateTime<Utc>) { self.updated_at = now; }
}

fn price_line<'a, F>(line: &CartItem, lookup: &F) -> Result<PricedLine, CartError>
where
    F: Fn(&Uuid) -> Option<&'a Product>,
{
    let product = lookup(&line.product_id).ok_or_else(|| CartError::UnknownItem {
        product_id: line.product_id, variant_id: line.variant_id.clone(),
    })?;
    let variant = product.purchasable_variant(&line.variant_id, line.quantity)?;
    Ok(PricedLine {
        line_id: line.id,
        product_id: product.id,
        variant_id: variant.id.clone(),
        product_name: product.name.clone(),
        variant_name: variant.name.clone(),
        sku: variant.sku.clone(),
        image: variant.image.clone().or_else(|| product.images.first().cloned()),
        unit_price: variant.price,
        unit_cost: variant.cost_price,
        quantity: line.quantity,
        fulfillment_type: product.fulfillment_type,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("Item not found")]
    ItemNotFound,
    #[error("Quantity must be at least 1")]
    InvalidQuantity,
    #[error("Product {product_id} variant {variant_id} is not available")]
    UnknownItem { product_id: Uuid, variant_id: String },
    #[error(transparent)]
    Product(#[from] ProductError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::tests::{new_product, variant};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn policy() -> ShippingPolicy {
        ShippingPolicy { free_shipping_threshold: dec!(50), standard_shipping: dec!(5.99) }
    }

    fn catalog(products: Vec<Product>) -> HashMap<Uuid, Product> {
        products.into_iter().map(|p| (p.id, p)).collect()
    }

    fn plush(price: Decimal) -> Product {
        Product::create(new_product("Plush Set", FulfillmentType::Manual, vec![variant("std", "DB-PLUSH-001", price, dec!(12))]), Utc::now()).unwrap()
    }

    fn totals(cart: &Cart, products: &HashMap<Uuid, Product>) -> CartSummary {
        let lines = cart.price(|id| products.get(id)).unwrap();
        cart.summary(&lines, &policy())
    }

    #[test]
    fn test_cart_operations() {
        let p = plush(dec!(10));
        let mut cart = Cart::new("sess-1", None, Utc::now());
        cart.add_item(p.id, "std", 1, Utc::now()).unwrap();
        cart.add_item(p.id, "std", 2, Utc::now()).unwrap();
        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.items()[0].quantity, 3); // Merged
        assert_eq!(cart.add_item(p.id, "std", 0, Utc::now()).unwrap_err(), CartError::InvalidQuantity);
    }

    #[test]
    fn test_update_quantity_zero_removes() {
        let p = plush(dec!(10));
        let mut cart = Cart::new("sess-1", None, Utc::now());
        let line = cart.add_item(p.id, "std", 2, Utc::now()).unwrap().id;
        cart.update_quantity(line, 5, Utc::now()).unwrap();
        assert_eq!(cart.items()[0].quantity, 5);
        cart.update_quantity(line, -1, Utc::now()).unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.remove_item(line, Utc::now()).unwrap_err(), CartError::ItemNotFound);
    }

    #[test]
    fn test_total_identity_and_flat_shipping() {
        let p = plush(dec!(19.99));
        let products = catalog(vec![p.clone()]);
        let mut cart = Cart::new("s", None, Utc::now());
        assert_eq!(totals(&cart, &products).shipping, Decimal::ZERO);
        cart.add_item(p.id, "std", 1, Utc::now()).unwrap();
        let s = totals(&cart, &products);
        assert_eq!(s.shipping, dec!(5.99));
        assert_eq!(s.total, s.subtotal - s.discount_amount + s.shipping);
    }

    #[test]
    fn test_threshold_waives_shipping_without_discount() {
        let p = plush(dec!(34.99));
        let products = catalog(vec![p.clone()]);
        let mut cart = Cart::new("s", None, Utc::now());
        cart.add_item(p.id, "std", 2, Utc::now()).unwrap();
        let s = totals(&cart, &products);
        assert_eq!(s.subtotal, dec!(69.98));
        assert_eq!(s.shipping, Decimal::ZERO);
        assert_eq!(s.total, dec!(69.98));
    }

    #[test]
    fn test_discount_round_trip_restores_total() {
        let p = plush(dec!(34.99));
        let products = catalog(vec![p.clone()]);
        let mut cart = Cart::new("s", None, Utc::now());
        cart.add_item(p.id, "std", 2, Utc::now()).unwrap();
        let before = totals(&cart, &products);
        cart.apply_discount(AppliedDiscount { code: CouponCode::new("SAVE10").unwrap(), kind: DiscountKind::Percentage, value: dec!(10) }, Utc::now());
        let with = totals(&cart, &products);
        assert_eq!(with.discount_amount, dec!(6.998));
        assert_eq!(with.total, dec!(62.982));
        cart.remove_discount(Utc::now());
        assert_eq!(totals(&cart, &products), before);
    }

    #[test]
    fn test_free_shipping_discount_zeroes_shipping_only() {
        let p = plush(dec!(10));
        let products = catalog(vec![p.clone()]);
        let mut cart = Cart::new("s", None, Utc::now());
        cart.add_item(p.id, "std", 1, Utc::now()).unwrap();
        cart.apply_discount(AppliedDiscount { code: CouponCode::new("SHIPFREE").unwrap(), kind: DiscountKind::FreeShipping, value: Decimal::ZERO }, Utc::now());
        let s = totals(&cart, &products);
        assert_eq!(s.discount_amount, Decimal::ZERO);
        assert_eq!(s.shipping, Decimal::ZERO);
        assert_eq!(s.total, dec!(10));
    }

    #[test]
    fn test_fixed_discount_capped_at_subtotal() {
        let p = plush(dec!(8));
        let products = catalog(vec![p.clone()]);
        let mut cart = Cart::new("s", None, Utc::now());
        cart.add_item(p.id, "std", 1, Utc::now()).unwrap();
        cart.apply_discount(AppliedDiscount { code: CouponCode::new("TEN").unwrap(), kind: DiscountKind::Fixed, value: dec!(10) }, Utc::now());
        let s = totals(&cart, &products);
        assert_eq!(s.discount_amount, dec!(8));
        assert_eq!(s.total, dec!(5.99));
    }

    #[test]
    fn test_merge_sums_matching_pairs() {
        let a = plush(dec!(10));
        let b = plush(dec!(20));
        let mut user = Cart::new("user-sess", Some("u1".into()), Utc::now());
        user.add_item(a.id, "std", 1, Utc::now()).unwrap();
        let mut guest = Cart::new("guest-sess", None, Utc::now());
        guest.add_item(a.id, "std", 2, Utc::now()).unwrap();
        guest.add_item(b.id, "std", 1, Utc::now()).unwrap();
        user.merge(&guest, Utc::now());
        assert_eq!(user.item_count(), 2);
        assert_eq!(user.items()[0].quantity, 3);
    }

    #[test]
    fn test_price_rejects_unknown_product() {
        let mut cart = Cart::new("s", None, Utc::now());
        cart.add_item(Uuid::now_v7(), "std", 1, Utc::now()).unwrap();
        let products: HashMap<Uuid, Product> = HashMap::new();
        assert!(matches!(cart.price(|id| products.get(id)), Err(CartError::UnknownItem { .. })));
    }

    #[test]
    fn test_price_available_sets_aside_inactive_lines() {
        let a = plush(dec!(34.99));
        let mut b = plush(dec!(10));
        b.is_active = false;
        let products = catalog(vec![a.clone(), b.clone()]);
        let mut cart = Cart::new("s", None, Utc::now());
        cart.add_item(a.id, "std", 1, Utc::now()).unwrap();
        cart.add_item(b.id, "std", 2, Utc::now()).unwrap();

        assert!(cart.price(|id| products.get(id)).is_err());
        let (lines, unavailable) = cart.price_available(|id| products.get(id));
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].product_id, a.id);
        assert_eq!(unavailable.len(), 1);
        assert_eq!(unavailable[0].line_id, cart.items()[1].id);
        assert_eq!(cart.summary(&lines, &policy()).subtotal, dec!(34.99));
    }
}
