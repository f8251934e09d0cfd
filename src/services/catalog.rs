//! Products and categories.

use chrono::Utc;
use uuid::Uuid;

use super::AppState;
use crate::domain::aggregates::{Category, NewProduct, Product, PublicProduct};
use crate::store::ProductFilter;
use crate::{Result, StorefrontError};

/// Active products for shoppers; `include_inactive` is ignored here.
pub async fn list_public(state: &AppState, filter: ProductFilter) -> Result<Vec<PublicProduct>> {
    let filter = ProductFilter { include_inactive: false, ..filter };
    let products = state.store.list_products(&filter).await?;
    Ok(products.iter().map(Product::public_view).collect())
}

pub async fn get_public_by_slug(state: &AppState, slug: &str) -> Result<PublicProduct> {
    match state.store.get_product_by_slug(slug).await? {
        Some(p) if p.is_active => Ok(p.public_view()),
        _ => Err(StorefrontError::not_found("Product not found")),
    }
}

pub async fn list_admin(state: &AppState, filter: ProductFilter) -> Result<Vec<Product>> {
    Ok(state.store.list_products(&filter).await?)
}

pub async fn create_product(state: &AppState, new: NewProduct) -> Result<Product> {
    let product = Product::create(new, Utc::now())?;
    state.store.insert_product(&product).await?;
    tracing::info!(product_id = %product.id, slug = %product.slug, "product created");
    Ok(product)
}

pub async fn update_product(state: &AppState, id: Uuid, new: NewProduct) -> Result<Product> {
    let mut product = state.store.get_product(id).await?.ok_or_else(|| StorefrontError::not_found("Product not found"))?;
    product.update(new, Utc::now())?;
    state.store.save_product(&product).await?;
    Ok(product)
}

/// Soft delete: placed orders keep pointing at the product.
pub async fn deactivate_product(state: &AppState, id: Uuid) -> Result<()> {
    let mut product = state.store.get_product(id).await?.ok_or_else(|| StorefrontError::not_found("Product not found"))?;
    product.deactivate(Utc::now());
    state.store.save_product(&product).await?;
    tracing::info!(product_id = %id, "product deactivated");
    Ok(())
}

pub async fn list_categories(state: &AppState) -> Result<Vec<Category>> {
    Ok(state.store.list_categories().await?.into_iter().filter(|c| c.is_active).collect())
}

pub async fn create_category(state: &AppState, name: &str, description: Option<String>, parent_id: Option<Uuid>, sort_order: i32) -> Result<Category> {
    let category = Category::create(name, description, parent_id, sort_order, Utc::now())?;
    state.store.insert_category(&category).await?;
    Ok(category)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::tests::{new_product, variant};
    use crate::domain::aggregates::FulfillmentType;
    use crate::services::tests::memory_state;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_deactivated_products_are_hidden_from_shoppers() {
        let state = memory_state();
        let p = create_product(&state, new_product("Bear Mug", FulfillmentType::Printful, vec![variant("v1", "PF-1", dec!(15), dec!(6))])).await.unwrap();
        assert_eq!(list_public(&state, ProductFilter::default()).await.unwrap().len(), 1);
        assert!(get_public_by_slug(&state, "bear-mug").await.is_ok());

        deactivate_product(&state, p.id).await.unwrap();
        assert!(list_public(&state, ProductFilter { include_inactive: true, ..Default::default() }).await.unwrap().is_empty());
        assert!(matches!(get_public_by_slug(&state, "bear-mug").await, Err(StorefrontError::NotFound(_))));
        assert_eq!(list_admin(&state, ProductFilter { include_inactive: true, ..Default::default() }).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_slug_is_a_validation_error() {
        let state = memory_state();
        let new = || new_product("Bear Mug", FulfillmentType::Printful, vec![variant("v1", "PF-1", dec!(15), dec!(6))]);
        create_product(&state, new()).await.unwrap();
        assert!(matches!(create_product(&state, new()).await, Err(StorefrontError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_keeps_identity() {
        let state = memory_state();
        let p = create_product(&state, new_product("Mug", FulfillmentType::Printful, vec![variant("v1", "PF-1", dec!(15), dec!(6))])).await.unwrap();
        let updated = update_product(&state, p.id, new_product("Big Mug", FulfillmentType::Printful, vec![variant("v1", "PF-1", dec!(18), dec!(6))])).await.unwrap();
        assert_eq!(updated.id, p.id);
        assert_eq!(updated.slug, "big-mug");
        assert!(matches!(update_product(&state, Uuid::now_v7(), new_product("X", FulfillmentType::Manual, vec![variant("v", "X-1", dec!(1), dec!(0))])).await, Err(StorefrontError::NotFound(_))));
    }
}
