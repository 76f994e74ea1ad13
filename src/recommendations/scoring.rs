use std::cmp::Ordering;
use std::collections::HashSet;

use crate::products::schemas::Product;

/// Cosine similarity over binary tag membership: |A ∩ B| / sqrt(|A| * |B|),
/// 0 when either set is empty. Stored tag weights never enter this
/// computation; only the set of names matters.
pub fn tag_similarity(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let set_a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let set_b: HashSet<&str> = b.iter().map(String::as_str).collect();
    let intersection = set_a.intersection(&set_b).count();

    intersection as f64 / ((set_a.len() * set_b.len()) as f64).sqrt()
}

pub struct Candidate {
    pub product: Product,
    pub score: f64,
}

/// Orders pooled candidates by score descending, keeps the highest-scored
/// entry per product id, and drops anything in the excluded set (lifetime
/// purchases plus caller-supplied exclusions).
pub fn rank_candidates(mut candidates: Vec<Candidate>, excluded: &HashSet<String>) -> Vec<Product> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut seen = HashSet::new();
    let mut ranked = Vec::new();

    for candidate in candidates {
        let id = candidate.product.product_id.clone();
        if excluded.contains(&id) || !seen.insert(id) {
            continue;
        }
        ranked.push(candidate.product);
    }

    ranked
}

/// Appends popularity-ordered backfill to a ranked list, skipping ids
/// already present, and cuts the result to `limit`.
pub fn merge_backfill(
    mut ranked: Vec<Product>,
    backfill: Vec<Product>,
    limit: usize,
) -> Vec<Product> {
    let mut seen: HashSet<String> = ranked
        .iter()
        .map(|product| product.product_id.clone())
        .collect();

    for product in backfill {
        if ranked.len() >= limit {
            break;
        }
        if seen.insert(product.product_id.clone()) {
            ranked.push(product);
        }
    }

    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::products::schemas::InteractionCounters;

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn product(id: &str, tag_names: &[&str]) -> Product {
        Product {
            product_id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            category: "test".to_string(),
            brand: None,
            original_price: 100.0,
            discounted_price: None,
            discounted_percent: None,
            stock: 1,
            is_active: true,
            is_flash: false,
            sizes: Vec::new(),
            tags: tags(tag_names),
            counters: InteractionCounters::default(),
            popularity_score: 0,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn similarity_is_symmetric() {
        let a = tags(&["electronics", "budget", "sale"]);
        let b = tags(&["electronics", "premium"]);
        assert_eq!(tag_similarity(&a, &b), tag_similarity(&b, &a));
    }

    #[test]
    fn similarity_of_identical_nonempty_sets_is_one() {
        let a = tags(&["shoes", "running", "sale"]);
        assert!((tag_similarity(&a, &a) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn similarity_with_empty_set_is_zero() {
        let a = tags(&["shoes"]);
        assert_eq!(tag_similarity(&a, &[]), 0.0);
        assert_eq!(tag_similarity(&[], &a), 0.0);
        assert_eq!(tag_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn duplicate_names_do_not_inflate_similarity() {
        let a = tags(&["shoes", "shoes", "sale"]);
        let b = tags(&["shoes"]);
        // Treated as {shoes, sale} vs {shoes}: 1 / sqrt(2).
        assert!((tag_similarity(&a, &b) - 1.0 / 2.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn two_shared_tags_beat_one() {
        let user = tags(&["electronics", "budget"]);
        let one_shared = tags(&["electronics", "premium"]);
        let two_shared = tags(&["electronics", "budget", "sale"]);

        let score_one = tag_similarity(&user, &one_shared) * 10.0;
        let score_two = tag_similarity(&user, &two_shared) * 10.0;

        // 1/sqrt(2*2) * 10 = 5.0 and 2/sqrt(2*3) * 10 ≈ 8.165.
        assert!((score_one - 5.0).abs() < 1e-9);
        assert!((score_two - 20.0 / 6.0_f64.sqrt()).abs() < 1e-9);
        assert!(score_two > score_one);
    }

    #[test]
    fn ranking_dedups_keeping_highest_score() {
        let candidates = vec![
            Candidate {
                product: product("a", &[]),
                score: 2.0,
            },
            Candidate {
                product: product("b", &[]),
                score: 5.0,
            },
            Candidate {
                product: product("a", &[]),
                score: 9.0,
            },
        ];

        let ranked = rank_candidates(candidates, &HashSet::new());
        let ids: Vec<&str> = ranked.iter().map(|p| p.product_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn ranking_excludes_purchased_products() {
        let candidates = vec![
            Candidate {
                product: product("a", &[]),
                score: 9.0,
            },
            Candidate {
                product: product("b", &[]),
                score: 5.0,
            },
        ];
        let excluded: HashSet<String> = ["a".to_string()].into();

        let ranked = rank_candidates(candidates, &excluded);
        let ids: Vec<&str> = ranked.iter().map(|p| p.product_id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[test]
    fn ranking_sorts_by_score_descending() {
        let candidates = vec![
            Candidate {
                product: product("low", &[]),
                score: 1.0,
            },
            Candidate {
                product: product("high", &[]),
                score: 8.0,
            },
            Candidate {
                product: product("mid", &[]),
                score: 4.0,
            },
        ];

        let ranked = rank_candidates(candidates, &HashSet::new());
        let ids: Vec<&str> = ranked.iter().map(|p| p.product_id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid", "low"]);
    }

    #[test]
    fn backfill_fills_to_limit_without_duplicates() {
        let ranked = vec![product("a", &[]), product("b", &[])];
        let backfill = vec![product("a", &[]), product("c", &[]), product("d", &[])];

        let merged = merge_backfill(ranked, backfill, 3);
        let ids: Vec<&str> = merged.iter().map(|p| p.product_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn result_length_is_min_of_limit_and_catalog() {
        let ranked = vec![product("a", &[])];
        let backfill = vec![product("b", &[])];

        // Catalog smaller than the limit: everything is returned once.
        let merged = merge_backfill(ranked.clone(), backfill.clone(), 10);
        assert_eq!(merged.len(), 2);

        // Limit smaller than the pool: exactly limit entries.
        let merged = merge_backfill(ranked, backfill, 1);
        assert_eq!(merged.len(), 1);
    }
}
