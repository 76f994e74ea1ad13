use serde::{Deserialize, Serialize};

pub const COLLECTIONS_PRODUCTS: &str = "products";

pub const MAX_NAME_LENGTH: usize = 200;
pub const MAX_DESCRIPTION_LENGTH: usize = 2000;
pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Raw interaction counters kept denormalized on the product document so the
/// popularity sort never needs the interaction log.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct InteractionCounters {
    #[serde(default)]
    pub view_count: i64,
    #[serde(default)]
    pub cart_add_count: i64,
    #[serde(default)]
    pub wishlist_count: i64,
    #[serde(default)]
    pub purchase_count: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Product {
    pub product_id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub brand: Option<String>,
    pub original_price: f64,
    pub discounted_price: Option<f64>,
    pub discounted_percent: Option<i64>,
    pub stock: i64,
    pub is_active: bool,
    pub is_flash: bool,
    #[serde(default)]
    pub sizes: Vec<String>,
    /// Derived; fully replaced on every create and attribute edit.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub counters: InteractionCounters,
    /// Derived from `counters`; cached for sorting, kept consistent by
    /// incrementing it in the same update that bumps a counter.
    #[serde(default)]
    pub popularity_score: i64,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Product {
    /// Discounted price when set, original otherwise. Drives the price-tier tag.
    #[inline]
    pub fn effective_price(&self) -> f64 {
        self.discounted_price.unwrap_or(self.original_price)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub description: String,
    pub category: String,
    pub brand: Option<String>,
    pub original_price: f64,
    pub discounted_price: Option<f64>,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub is_flash: bool,
    #[serde(default)]
    pub sizes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub original_price: Option<f64>,
    pub discounted_price: Option<f64>,
    pub stock: Option<i64>,
    pub is_active: Option<bool>,
    pub is_flash: Option<bool>,
    pub sizes: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListProductsQuery {
    pub category: Option<String>,
    pub flash: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<u64>,
}
