use futures::TryStreamExt;
use mongodb::{
    Collection,
    bson::{Document, doc, to_bson},
};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;
use uuid::Uuid;

use super::{
    schemas::*,
    tagging::{TagSource, discounted_percent, generate_tags},
};
use crate::{DB, apex::utils::ApiError, config::config};

#[inline]
fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn products_collection() -> Result<Collection<Product>, ApiError> {
    let database = DB.get().ok_or(ApiError::DatabaseUnavailable)?;
    Ok(database.collection(COLLECTIONS_PRODUCTS))
}

fn validate_attributes(
    name: &str,
    description: &str,
    original_price: f64,
    discounted_price: Option<f64>,
) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::Validation(
            "Product name cannot be empty".to_string(),
        ));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(ApiError::Validation(format!(
            "Product name cannot exceed {} characters",
            MAX_NAME_LENGTH
        )));
    }
    if description.trim().is_empty() {
        return Err(ApiError::Validation(
            "Product description cannot be empty".to_string(),
        ));
    }
    if description.len() > MAX_DESCRIPTION_LENGTH {
        return Err(ApiError::Validation(format!(
            "Product description cannot exceed {} characters",
            MAX_DESCRIPTION_LENGTH
        )));
    }
    if original_price < 0.0 {
        return Err(ApiError::Validation(
            "Price cannot be negative".to_string(),
        ));
    }
    if let Some(discounted) = discounted_price {
        if discounted < 0.0 || discounted > original_price {
            return Err(ApiError::Validation(
                "Discounted price must be between zero and the original price".to_string(),
            ));
        }
    }
    Ok(())
}

pub async fn create_product(request: CreateProductRequest) -> Result<Product, ApiError> {
    validate_attributes(
        &request.name,
        &request.description,
        request.original_price,
        request.discounted_price,
    )?;

    let now = now_epoch_secs();
    let percent = discounted_percent(request.original_price, request.discounted_price);

    let mut product = Product {
        product_id: Uuid::new_v4().to_string(),
        name: request.name,
        description: request.description,
        category: request.category,
        brand: request.brand,
        original_price: request.original_price,
        discounted_price: request.discounted_price,
        discounted_percent: percent,
        stock: request.stock,
        is_active: true,
        is_flash: request.is_flash,
        sizes: request.sizes,
        tags: Vec::new(),
        counters: InteractionCounters::default(),
        popularity_score: 0,
        created_at: now,
        updated_at: now,
    };
    product.tags = generate_tags(&TagSource::from(&product), config());

    products_collection()?.insert_one(&product).await?;

    info!(product_id = %product.product_id, "product created");
    Ok(product)
}

pub async fn get_product_by_id(product_id: &str) -> Result<Product, ApiError> {
    products_collection()?
        .find_one(doc! { "product_id": product_id })
        .await?
        .ok_or(ApiError::NotFound("Product"))
}

pub async fn list_products(query: ListProductsQuery) -> Result<Vec<Product>, ApiError> {
    let mut filter = doc! { "is_active": true };
    if let Some(category) = query.category {
        filter.insert("category", category);
    }
    if let Some(flash) = query.flash {
        filter.insert("is_flash", flash);
    }

    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT);

    let cursor = products_collection()?
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .skip(query.offset.unwrap_or(0))
        .limit(limit)
        .await?;

    Ok(cursor.try_collect().await?)
}

/// The `$set` document for a product edit. Only descriptive attributes and
/// the fields derived from them are written; the interaction counters and
/// the cached popularity score belong to the concurrent `$inc` path and
/// must never be written back from a read copy.
fn attribute_update_doc(product: &Product) -> Result<Document, ApiError> {
    fn bson<T: serde::Serialize>(value: &T) -> Result<mongodb::bson::Bson, ApiError> {
        to_bson(value).map_err(|err| ApiError::Internal(err.to_string()))
    }

    Ok(doc! {
        "name": &product.name,
        "description": &product.description,
        "category": &product.category,
        "brand": bson(&product.brand)?,
        "original_price": product.original_price,
        "discounted_price": bson(&product.discounted_price)?,
        "discounted_percent": bson(&product.discounted_percent)?,
        "stock": product.stock,
        "is_active": product.is_active,
        "is_flash": product.is_flash,
        "sizes": product.sizes.clone(),
        "tags": product.tags.clone(),
        "updated_at": product.updated_at as i64,
    })
}

/// Applies a partial edit, regenerating the derived fields. The tag set is
/// fully replaced, never merged. Counters and the popularity score are left
/// untouched so interleaved interaction bumps are never erased.
pub async fn update_product(
    product_id: &str,
    request: UpdateProductRequest,
) -> Result<Product, ApiError> {
    let collection = products_collection()?;

    let mut product = collection
        .find_one(doc! { "product_id": product_id })
        .await?
        .ok_or(ApiError::NotFound("Product"))?;

    if let Some(name) = request.name {
        product.name = name;
    }
    if let Some(description) = request.description {
        product.description = description;
    }
    if let Some(category) = request.category {
        product.category = category;
    }
    if request.brand.is_some() {
        product.brand = request.brand;
    }
    if let Some(original_price) = request.original_price {
        product.original_price = original_price;
    }
    if request.discounted_price.is_some() {
        product.discounted_price = request.discounted_price;
    }
    if let Some(stock) = request.stock {
        product.stock = stock;
    }
    if let Some(is_active) = request.is_active {
        product.is_active = is_active;
    }
    if let Some(is_flash) = request.is_flash {
        product.is_flash = is_flash;
    }
    if let Some(sizes) = request.sizes {
        product.sizes = sizes;
    }

    validate_attributes(
        &product.name,
        &product.description,
        product.original_price,
        product.discounted_price,
    )?;

    product.discounted_percent =
        discounted_percent(product.original_price, product.discounted_price);
    product.tags = generate_tags(&TagSource::from(&product), config());
    product.updated_at = now_epoch_secs();

    collection
        .update_one(
            doc! { "product_id": product_id },
            doc! { "$set": attribute_update_doc(&product)? },
        )
        .await?;

    Ok(product)
}

/// Soft delete: the product drops out of listings and recommendation pools
/// but its interaction history stays intact.
pub async fn delete_product(product_id: &str) -> Result<(), ApiError> {
    let result = products_collection()?
        .update_one(
            doc! { "product_id": product_id },
            doc! { "$set": { "is_active": false } },
        )
        .await?;

    if result.matched_count == 0 {
        return Err(ApiError::NotFound("Product"));
    }

    info!(product_id, "product deactivated");
    Ok(())
}

/// Atomically bumps one interaction counter together with the cached
/// popularity score. The score is linear in the counters, so folding its
/// coefficient into the same `$inc` keeps the two consistent without a
/// read-modify-write cycle.
pub async fn apply_interaction(
    product_id: &str,
    counter_field: &'static str,
    score_delta: i64,
) -> Result<(), ApiError> {
    let mut increments = mongodb::bson::Document::new();
    increments.insert(counter_field, 1_i64);
    increments.insert("popularity_score", score_delta);

    products_collection()?
        .update_one(
            doc! { "product_id": product_id },
            doc! { "$inc": increments },
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edited_product() -> Product {
        Product {
            product_id: "p-1".to_string(),
            name: "Trail Jacket".to_string(),
            description: "Windproof shell".to_string(),
            category: "outerwear".to_string(),
            brand: Some("Northpeak".to_string()),
            original_price: 120.0,
            discounted_price: Some(90.0),
            discounted_percent: Some(25),
            stock: 8,
            is_active: true,
            is_flash: false,
            sizes: vec!["m".to_string(), "l".to_string()],
            tags: vec!["outerwear".to_string(), "northpeak".to_string()],
            counters: InteractionCounters {
                view_count: 40,
                cart_add_count: 6,
                wishlist_count: 3,
                purchase_count: 2,
            },
            popularity_score: 74,
            created_at: 1_700_000_000,
            updated_at: 1_700_000_100,
        }
    }

    #[test]
    fn product_edits_never_write_counters_or_score() {
        let update = attribute_update_doc(&edited_product()).unwrap();

        for counter_owned in [
            "view_count",
            "cart_add_count",
            "wishlist_count",
            "purchase_count",
            "popularity_score",
        ] {
            assert!(!update.contains_key(counter_owned), "{counter_owned}");
        }

        // The descriptive attributes and their derived fields are written.
        assert!(update.contains_key("name"));
        assert!(update.contains_key("tags"));
        assert!(update.contains_key("discounted_percent"));
        assert!(update.contains_key("updated_at"));
    }
}
