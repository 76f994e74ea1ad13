use std::{env, fmt::Display, str::FromStr, sync::OnceLock};
use tracing::warn;

/// Tuning knobs for tag generation, popularity scoring, and the
/// recommendation engine. Loaded once at startup; every scoring function
/// takes this by reference instead of reading scattered literals.
#[derive(Debug, Clone)]
pub struct RecommendationConfig {
    /// Effective prices below this are tagged `budget`.
    pub budget_price_max: f64,
    /// Effective prices below this (and at or above `budget_price_max`)
    /// are tagged `mid-range`; everything else is `premium`.
    pub mid_range_price_max: f64,
    /// Discount percentages strictly above this add a `sale` tag.
    pub sale_discount_cutoff: i64,

    pub view_weight: i64,
    pub cart_weight: i64,
    pub wishlist_weight: i64,
    pub purchase_weight: i64,

    /// Minimum tag-profile similarity for another user to count as similar.
    pub similarity_cutoff: f64,
    /// How many tag-matching products the content strategy pulls.
    pub content_pool_size: i64,
    /// How many tag-sharing users the collaborative strategy pulls.
    pub similar_user_pool_size: i64,
    /// How many of those users are actually kept, best-first.
    pub similar_users_kept: usize,
    /// Content-strategy scores are similarity times this.
    pub content_score_scale: f64,

    pub default_limit: i64,
    pub max_limit: i64,

    /// Budget for the personalized computation before it degrades to the
    /// popularity path.
    pub lookup_timeout_secs: u64,
}

impl RecommendationConfig {
    pub fn load() -> Self {
        Self {
            budget_price_max: try_load("BUDGET_PRICE_MAX", "500"),
            mid_range_price_max: try_load("MID_RANGE_PRICE_MAX", "2000"),
            sale_discount_cutoff: try_load("SALE_DISCOUNT_CUTOFF", "20"),
            view_weight: try_load("VIEW_WEIGHT", "1"),
            cart_weight: try_load("CART_WEIGHT", "3"),
            wishlist_weight: try_load("WISHLIST_WEIGHT", "2"),
            purchase_weight: try_load("PURCHASE_WEIGHT", "5"),
            similarity_cutoff: try_load("SIMILARITY_CUTOFF", "0.2"),
            content_pool_size: try_load("CONTENT_POOL_SIZE", "50"),
            similar_user_pool_size: try_load("SIMILAR_USER_POOL_SIZE", "50"),
            similar_users_kept: try_load("SIMILAR_USERS_KEPT", "10"),
            content_score_scale: try_load("CONTENT_SCORE_SCALE", "10"),
            default_limit: try_load("RECOMMENDATION_DEFAULT_LIMIT", "10"),
            max_limit: try_load("RECOMMENDATION_MAX_LIMIT", "50"),
            lookup_timeout_secs: try_load("RECOMMENDATION_TIMEOUT_SECS", "3"),
        }
    }
}

static CONFIG: OnceLock<RecommendationConfig> = OnceLock::new();

pub fn config() -> &'static RecommendationConfig {
    CONFIG.get_or_init(RecommendationConfig::load)
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}, using default {default}");
        })
        .or_else(|_| default.parse().map_err(|_| ()))
        .expect("Default configuration value failed to parse")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_observed_behavior() {
        let cfg = RecommendationConfig::load();
        assert_eq!(cfg.budget_price_max, 500.0);
        assert_eq!(cfg.mid_range_price_max, 2000.0);
        assert_eq!(cfg.sale_discount_cutoff, 20);
        // Purchase > cart > wishlist > view, preserved as observed.
        assert!(cfg.purchase_weight > cfg.cart_weight);
        assert!(cfg.cart_weight > cfg.wishlist_weight);
        assert!(cfg.wishlist_weight > cfg.view_weight);
        assert_eq!(cfg.similarity_cutoff, 0.2);
        assert_eq!(cfg.similar_users_kept, 10);
    }
}
