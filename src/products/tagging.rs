use std::collections::BTreeSet;

use super::schemas::{InteractionCounters, Product};
use crate::config::RecommendationConfig;

/// Minimum word length from the product name to become a tag; shorter words
/// are treated as connectors and skipped.
const MIN_NAME_WORD_LENGTH: usize = 4;

/// Product attributes that feed tag derivation. Split out from [`Product`] so
/// tags can be computed for a document that does not exist yet.
pub struct TagSource<'a> {
    pub name: &'a str,
    pub category: &'a str,
    pub brand: Option<&'a str>,
    pub original_price: f64,
    pub discounted_price: Option<f64>,
    pub discounted_percent: Option<i64>,
    pub sizes: &'a [String],
}

impl<'a> From<&'a Product> for TagSource<'a> {
    fn from(product: &'a Product) -> Self {
        Self {
            name: &product.name,
            category: &product.category,
            brand: product.brand.as_deref(),
            original_price: product.original_price,
            discounted_price: product.discounted_price,
            discounted_percent: product.discounted_percent,
            sizes: &product.sizes,
        }
    }
}

/// Derives the full tag set for a product. Deterministic and
/// order-independent: the result is lowercase, deduplicated, and sorted, and
/// replaces (never merges with) the stored tag set.
pub fn generate_tags(source: &TagSource<'_>, config: &RecommendationConfig) -> Vec<String> {
    let mut tags = BTreeSet::new();

    if !source.category.trim().is_empty() {
        tags.insert(source.category.trim().to_lowercase());
    }

    if let Some(brand) = source.brand {
        if !brand.trim().is_empty() {
            tags.insert(brand.trim().to_lowercase());
        }
    }

    for word in source.name.split_whitespace() {
        // Character count, not byte length: multibyte words must clear the
        // same bar as ASCII ones.
        if word.chars().count() >= MIN_NAME_WORD_LENGTH {
            tags.insert(word.to_lowercase());
        }
    }

    tags.insert(price_tier(effective_price(source), config).to_string());

    if source.discounted_percent.unwrap_or(0) > config.sale_discount_cutoff {
        tags.insert("sale".to_string());
    }

    for size in source.sizes {
        if !size.trim().is_empty() {
            tags.insert(format!("size-{}", size.trim().to_lowercase()));
        }
    }

    tags.into_iter().collect()
}

#[inline]
fn effective_price(source: &TagSource<'_>) -> f64 {
    source.discounted_price.unwrap_or(source.original_price)
}

fn price_tier(price: f64, config: &RecommendationConfig) -> &'static str {
    if price < config.budget_price_max {
        "budget"
    } else if price < config.mid_range_price_max {
        "mid-range"
    } else {
        "premium"
    }
}

/// Discount percentage rounded to the nearest whole percent, or `None` when
/// there is no discounted price to compare against.
pub fn discounted_percent(original_price: f64, discounted_price: Option<f64>) -> Option<i64> {
    let discounted = discounted_price?;
    if original_price <= 0.0 {
        return None;
    }
    Some((((original_price - discounted) / original_price) * 100.0).round() as i64)
}

/// Reduces the four raw counters to one ranking number. Purchase > cart >
/// wishlist > view; the cart-above-wishlist ordering is preserved as observed
/// in production data, pending product-owner confirmation.
pub fn popularity_score(counters: &InteractionCounters, config: &RecommendationConfig) -> i64 {
    config.purchase_weight * counters.purchase_count
        + config.cart_weight * counters.cart_add_count
        + config.wishlist_weight * counters.wishlist_count
        + config.view_weight * counters.view_count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> RecommendationConfig {
        RecommendationConfig::load()
    }

    fn source<'a>(name: &'a str, category: &'a str, price: f64) -> TagSource<'a> {
        TagSource {
            name,
            category,
            brand: None,
            original_price: price,
            discounted_price: None,
            discounted_percent: None,
            sizes: &[],
        }
    }

    #[test]
    fn deterministic_and_sorted() {
        let src = TagSource {
            name: "Noise Cancelling Headphones",
            category: "Audio",
            brand: Some("Sonic"),
            original_price: 1800.0,
            discounted_price: None,
            discounted_percent: None,
            sizes: &[],
        };
        let first = generate_tags(&src, &cfg());
        let second = generate_tags(&src, &cfg());
        assert_eq!(first, second);
        let mut sorted = first.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(first, sorted);
    }

    #[test]
    fn category_brand_and_long_name_words() {
        let src = TagSource {
            name: "Pro Max Gaming Mouse",
            category: "Electronics",
            brand: Some("Logi"),
            original_price: 300.0,
            discounted_price: None,
            discounted_percent: None,
            sizes: &[],
        };
        let tags = generate_tags(&src, &cfg());
        assert!(tags.contains(&"electronics".to_string()));
        assert!(tags.contains(&"logi".to_string()));
        assert!(tags.contains(&"gaming".to_string()));
        assert!(tags.contains(&"mouse".to_string()));
        // "Pro" and "Max" are under the word-length cutoff.
        assert!(!tags.contains(&"pro".to_string()));
        assert!(!tags.contains(&"max".to_string()));
    }

    #[test]
    fn name_word_cutoff_counts_characters_not_bytes() {
        // "süß" is three characters (five bytes); "müsli" is five characters.
        let tags = generate_tags(&source("Süß Müsli Schale", "Food", 50.0), &cfg());
        assert!(!tags.contains(&"süß".to_string()));
        assert!(tags.contains(&"müsli".to_string()));
        assert!(tags.contains(&"schale".to_string()));
    }

    #[test]
    fn price_tier_boundaries() {
        let config = cfg();
        assert!(generate_tags(&source("x", "c", 499.99), &config).contains(&"budget".to_string()));
        assert!(
            generate_tags(&source("x", "c", 500.0), &config).contains(&"mid-range".to_string())
        );
        assert!(
            generate_tags(&source("x", "c", 1999.99), &config).contains(&"mid-range".to_string())
        );
        assert!(generate_tags(&source("x", "c", 2000.0), &config).contains(&"premium".to_string()));
    }

    #[test]
    fn discounted_price_drives_the_tier() {
        let src = TagSource {
            discounted_price: Some(450.0),
            ..source("x", "c", 2500.0)
        };
        let tags = generate_tags(&src, &cfg());
        assert!(tags.contains(&"budget".to_string()));
        assert!(!tags.contains(&"premium".to_string()));
    }

    #[test]
    fn sale_tag_requires_discount_above_cutoff() {
        let config = cfg();
        let at_cutoff = TagSource {
            discounted_percent: Some(20),
            ..source("x", "c", 100.0)
        };
        assert!(!generate_tags(&at_cutoff, &config).contains(&"sale".to_string()));

        let above_cutoff = TagSource {
            discounted_percent: Some(21),
            ..source("x", "c", 100.0)
        };
        assert!(generate_tags(&above_cutoff, &config).contains(&"sale".to_string()));
    }

    #[test]
    fn size_tags_are_lowercased_and_prefixed() {
        let sizes = vec!["M".to_string(), "XL".to_string()];
        let src = TagSource {
            sizes: &sizes,
            ..source("Shirt", "Clothing", 100.0)
        };
        let tags = generate_tags(&src, &cfg());
        assert!(tags.contains(&"size-m".to_string()));
        assert!(tags.contains(&"size-xl".to_string()));
    }

    #[test]
    fn discounted_percent_rounds() {
        assert_eq!(discounted_percent(1000.0, Some(750.0)), Some(25));
        assert_eq!(discounted_percent(300.0, Some(200.0)), Some(33));
        assert_eq!(discounted_percent(1000.0, None), None);
        assert_eq!(discounted_percent(0.0, Some(10.0)), None);
    }

    #[test]
    fn popularity_formula_is_exact() {
        let counters = InteractionCounters {
            view_count: 7,
            cart_add_count: 3,
            wishlist_count: 2,
            purchase_count: 5,
        };
        // 5*5 + 3*3 + 2*2 + 1*7
        assert_eq!(popularity_score(&counters, &cfg()), 45);
        assert_eq!(
            popularity_score(&InteractionCounters::default(), &cfg()),
            0
        );
    }
}
