use futures::TryStreamExt;
use mongodb::{Collection, bson::doc};
use std::{
    collections::{HashMap, HashSet},
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    schemas::*,
    scoring::{Candidate, merge_backfill, rank_candidates, tag_similarity},
};
use crate::{
    DB,
    apex::utils::ApiError,
    auth::schemas::{COLLECTIONS_USERS, User},
    config::{RecommendationConfig, config},
    products::{
        delegates::{apply_interaction, get_product_by_id},
        schemas::{COLLECTIONS_PRODUCTS, Product},
    },
};

fn interactions_collection() -> Result<Collection<Interaction>, ApiError> {
    let database = DB.get().ok_or(ApiError::DatabaseUnavailable)?;
    Ok(database.collection(COLLECTIONS_INTERACTIONS))
}

fn users_collection() -> Result<Collection<User>, ApiError> {
    let database = DB.get().ok_or(ApiError::DatabaseUnavailable)?;
    Ok(database.collection(COLLECTIONS_USERS))
}

fn products_collection() -> Result<Collection<Product>, ApiError> {
    let database = DB.get().ok_or(ApiError::DatabaseUnavailable)?;
    Ok(database.collection(COLLECTIONS_PRODUCTS))
}

#[inline]
fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Who an interaction or recommendation request is attributed to.
/// Authenticated identity wins over the session header when both are present.
pub struct CallerIdentity {
    pub user: Option<User>,
    pub session_id: Option<String>,
}

impl CallerIdentity {
    pub fn is_attributable(&self) -> bool {
        self.user.is_some() || self.session_id.is_some()
    }
}

pub enum TrackOutcome {
    Recorded,
    /// The referenced product does not exist; the event is dropped and
    /// logged, never surfaced as an error.
    UnknownProduct,
}

pub async fn record_interaction(
    caller: &CallerIdentity,
    product_id: &str,
    kind: InteractionKind,
    event_id: Option<String>,
) -> Result<TrackOutcome, ApiError> {
    if !caller.is_attributable() {
        return Err(ApiError::Validation(
            "A session id or an authenticated session is required".to_string(),
        ));
    }

    let product = match get_product_by_id(product_id).await {
        Ok(product) => product,
        Err(ApiError::NotFound(_)) => {
            warn!(product_id, kind = kind.as_str(), "dropping interaction for unknown product");
            return Ok(TrackOutcome::UnknownProduct);
        }
        Err(err) => return Err(err),
    };

    let cfg = config();
    let user_id = caller.user.as_ref().map(|user| user.uid.clone());
    let interaction = Interaction {
        event_id: event_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        product_id: product_id.to_string(),
        session_id: if user_id.is_some() {
            None
        } else {
            caller.session_id.clone()
        },
        user_id,
        kind,
        weight: kind.weight(cfg),
        created_at: now_epoch_secs(),
    };

    // The event record is the durability-critical write; everything after it
    // is derived state.
    interactions_collection()?.insert_one(&interaction).await?;

    apply_interaction(product_id, kind.counter_field(), kind.weight(cfg)).await?;

    // Tag propagation is best-effort: a failure here must not fail the
    // request that recorded the event.
    if let Some(user) = &caller.user {
        if !product.tags.is_empty() {
            if let Err(err) = merge_weighted_tags(&user.uid, &product.tags).await {
                warn!(uid = %user.uid, error = %err, "failed to propagate product tags to user");
            }
        }
    }

    info!(
        product_id,
        kind = kind.as_str(),
        authenticated = caller.user.is_some(),
        "interaction recorded"
    );
    Ok(TrackOutcome::Recorded)
}

/// Report line for one batch element. Only a recorded event counts as a
/// success; an unknown product is a per-element failure here, unlike the
/// single-track endpoint which drops it silently.
fn element_result(product_id: String, outcome: Result<TrackOutcome, ApiError>) -> TrackResult {
    match outcome {
        Ok(TrackOutcome::Recorded) => TrackResult {
            product_id,
            success: true,
            error: None,
        },
        Ok(TrackOutcome::UnknownProduct) => TrackResult {
            product_id,
            success: false,
            error: Some("Product not found".to_string()),
        },
        Err(err) => TrackResult {
            product_id,
            success: false,
            error: Some(err.to_string()),
        },
    }
}

/// Processes each element independently; an unknown product or a bad type in
/// one element never aborts the rest of the batch.
pub async fn batch_track(
    caller: &CallerIdentity,
    items: Vec<TrackRequest>,
) -> Result<Vec<TrackResult>, ApiError> {
    if !caller.is_attributable() {
        return Err(ApiError::Validation(
            "A session id or an authenticated session is required".to_string(),
        ));
    }

    let mut results = Vec::with_capacity(items.len());

    for item in items {
        let Some(kind) = InteractionKind::parse(&item.kind) else {
            results.push(element_result(
                item.product_id,
                Err(ApiError::Validation(format!(
                    "Unknown interaction type: {}",
                    item.kind
                ))),
            ));
            continue;
        };

        let outcome = record_interaction(caller, &item.product_id, kind, item.event_id).await;
        results.push(element_result(item.product_id, outcome));
    }

    Ok(results)
}

/// Increments the count of each tag already on the user's profile and adds
/// missing tags with a count of one. Counts only ever grow.
async fn merge_weighted_tags(uid: &str, tags: &[String]) -> Result<(), ApiError> {
    let users = users_collection()?;

    for tag in tags {
        let updated = users
            .update_one(
                doc! { "uid": uid, "tags.name": tag },
                doc! { "$inc": { "tags.$.count": 1_i64 } },
            )
            .await?;

        if updated.matched_count == 0 {
            users
                .update_one(
                    doc! { "uid": uid, "tags.name": { "$ne": tag } },
                    doc! { "$push": { "tags": { "name": tag, "count": 1_i64 } } },
                )
                .await?;
        }
    }

    Ok(())
}

/// Client-requested tag update: add-if-absent only, existing counts are left
/// untouched.
pub async fn add_tags_if_absent(uid: &str, tags: &[String]) -> Result<(), ApiError> {
    let users = users_collection()?;

    for tag in tags {
        let normalized = tag.trim().to_lowercase();
        if normalized.is_empty() {
            continue;
        }
        users
            .update_one(
                doc! { "uid": uid, "tags.name": { "$ne": &normalized } },
                doc! { "$push": { "tags": { "name": normalized, "count": 1_i64 } } },
            )
            .await?;
    }

    Ok(())
}

pub async fn get_recommendations(
    caller: Option<&User>,
    strategy: Strategy,
    limit: usize,
    exclude_ids: Vec<String>,
) -> Result<RecommendationResponse, ApiError> {
    let cfg = config();

    let Some(user) = caller else {
        let products = popular_products(limit as i64, &exclude_ids).await?;
        return Ok(RecommendationResponse {
            success: true,
            products,
            strategy: Strategy::Popularity,
            user_tags: None,
        });
    };

    if strategy == Strategy::Popularity {
        let products = popular_products(limit as i64, &exclude_ids).await?;
        return Ok(RecommendationResponse {
            success: true,
            products,
            strategy,
            user_tags: Some(user.tag_names()),
        });
    }

    // Recommendations are a non-critical enhancement: a slow or failing
    // personalized computation degrades to the popularity path instead of
    // blocking the caller.
    let personalized = tokio::time::timeout(
        Duration::from_secs(cfg.lookup_timeout_secs),
        personalized_products(user, strategy, limit, &exclude_ids, cfg),
    )
    .await;

    match personalized {
        Ok(Ok(products)) => Ok(RecommendationResponse {
            success: true,
            products,
            strategy,
            user_tags: Some(user.tag_names()),
        }),
        Ok(Err(err)) => {
            warn!(uid = %user.uid, error = %err, "personalized recommendations failed, degrading to popularity");
            let products = popular_products(limit as i64, &exclude_ids).await?;
            Ok(RecommendationResponse {
                success: true,
                products,
                strategy: Strategy::Popularity,
                user_tags: Some(user.tag_names()),
            })
        }
        Err(_) => {
            warn!(uid = %user.uid, "personalized recommendations timed out, degrading to popularity");
            let products = popular_products(limit as i64, &exclude_ids).await?;
            Ok(RecommendationResponse {
                success: true,
                products,
                strategy: Strategy::Popularity,
                user_tags: Some(user.tag_names()),
            })
        }
    }
}

async fn personalized_products(
    user: &User,
    strategy: Strategy,
    limit: usize,
    exclude_ids: &[String],
    cfg: &RecommendationConfig,
) -> Result<Vec<Product>, ApiError> {
    let tag_names = user.tag_names();
    let mut candidates = Vec::new();

    if strategy.wants_content() && !tag_names.is_empty() {
        candidates.extend(content_candidates(&tag_names, cfg).await?);
    }

    if strategy.wants_collaborative() && !tag_names.is_empty() {
        candidates.extend(collaborative_candidates(user, &tag_names, cfg).await?);
    }

    let mut excluded = purchased_product_ids(&user.uid).await?;
    excluded.extend(exclude_ids.iter().cloned());

    let ranked = rank_candidates(candidates, &excluded);

    if ranked.len() >= limit {
        let mut ranked = ranked;
        ranked.truncate(limit);
        return Ok(ranked);
    }

    let mut skip: Vec<String> = ranked
        .iter()
        .map(|product| product.product_id.clone())
        .collect();
    skip.extend(excluded);

    let backfill = popular_products((limit - ranked.len()) as i64, &skip).await?;
    Ok(merge_backfill(ranked, backfill, limit))
}

async fn content_candidates(
    tag_names: &[String],
    cfg: &RecommendationConfig,
) -> Result<Vec<Candidate>, ApiError> {
    let cursor = products_collection()?
        .find(doc! { "tags": { "$in": tag_names.to_vec() }, "is_active": true })
        .limit(cfg.content_pool_size)
        .await?;

    let products: Vec<Product> = cursor.try_collect().await?;

    Ok(products
        .into_iter()
        .map(|product| {
            let score = tag_similarity(tag_names, &product.tags) * cfg.content_score_scale;
            Candidate { product, score }
        })
        .collect())
}

/// Tag-profile neighbours of the caller: users sharing at least one tag,
/// scored by set similarity, cut at the configured threshold, best-first.
async fn similar_users(
    user: &User,
    tag_names: &[String],
    cfg: &RecommendationConfig,
) -> Result<Vec<(String, f64)>, ApiError> {
    let cursor = users_collection()?
        .find(doc! {
            "uid": { "$ne": &user.uid },
            "tags.name": { "$in": tag_names.to_vec() }
        })
        .limit(cfg.similar_user_pool_size)
        .await?;

    let others: Vec<User> = cursor.try_collect().await?;

    let mut scored: Vec<(String, f64)> = others
        .into_iter()
        .filter_map(|other| {
            let similarity = tag_similarity(tag_names, &other.tag_names());
            (similarity > cfg.similarity_cutoff).then_some((other.uid, similarity))
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(cfg.similar_users_kept);

    Ok(scored)
}

async fn collaborative_candidates(
    user: &User,
    tag_names: &[String],
    cfg: &RecommendationConfig,
) -> Result<Vec<Candidate>, ApiError> {
    let neighbours = similar_users(user, tag_names, cfg).await?;
    if neighbours.is_empty() {
        return Ok(Vec::new());
    }

    let similarity_by_uid: HashMap<&str, f64> = neighbours
        .iter()
        .map(|(uid, similarity)| (uid.as_str(), *similarity))
        .collect();
    let neighbour_uids: Vec<String> = neighbours.iter().map(|(uid, _)| uid.clone()).collect();

    let cursor = interactions_collection()?
        .find(doc! { "user_id": { "$in": neighbour_uids } })
        .await?;
    let interactions: Vec<Interaction> = cursor.try_collect().await?;

    // Each neighbour's every interaction contributes weight x similarity to
    // the touched product's running score.
    let mut scores: HashMap<String, f64> = HashMap::new();
    for interaction in &interactions {
        let Some(user_id) = interaction.user_id.as_deref() else {
            continue;
        };
        let Some(similarity) = similarity_by_uid.get(user_id) else {
            continue;
        };
        *scores.entry(interaction.product_id.clone()).or_default() +=
            interaction.kind.weight(cfg) as f64 * similarity;
    }

    if scores.is_empty() {
        return Ok(Vec::new());
    }

    let product_ids: Vec<String> = scores.keys().cloned().collect();
    let cursor = products_collection()?
        .find(doc! { "product_id": { "$in": product_ids }, "is_active": true })
        .await?;
    let products: Vec<Product> = cursor.try_collect().await?;

    Ok(products
        .into_iter()
        .filter_map(|product| {
            scores
                .get(&product.product_id)
                .map(|score| Candidate {
                    score: *score,
                    product,
                })
        })
        .collect())
}

/// Lifetime purchase history, used to keep already-bought products out of
/// every recommendation response.
async fn purchased_product_ids(uid: &str) -> Result<HashSet<String>, ApiError> {
    let cursor = interactions_collection()?
        .find(doc! { "user_id": uid, "kind": "purchase" })
        .await?;
    let purchases: Vec<Interaction> = cursor.try_collect().await?;

    Ok(purchases
        .into_iter()
        .map(|interaction| interaction.product_id)
        .collect())
}

/// Global fallback ranking: popularity score descending, ties broken by raw
/// view count.
async fn popular_products(limit: i64, exclude_ids: &[String]) -> Result<Vec<Product>, ApiError> {
    if limit <= 0 {
        return Ok(Vec::new());
    }

    let mut filter = doc! { "is_active": true };
    if !exclude_ids.is_empty() {
        filter.insert("product_id", doc! { "$nin": exclude_ids.to_vec() });
    }

    let cursor = products_collection()?
        .find(filter)
        .sort(doc! { "popularity_score": -1, "view_count": -1 })
        .limit(limit)
        .await?;

    Ok(cursor.try_collect().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_report_keeps_one_line_per_element() {
        let outcomes = vec![
            ("p-1".to_string(), Ok(TrackOutcome::Recorded)),
            ("p-missing".to_string(), Ok(TrackOutcome::UnknownProduct)),
            ("p-3".to_string(), Ok(TrackOutcome::Recorded)),
        ];

        let results: Vec<TrackResult> = outcomes
            .into_iter()
            .map(|(product_id, outcome)| element_result(product_id, outcome))
            .collect();

        assert_eq!(results.len(), 3);
        assert_eq!(results.iter().filter(|r| !r.success).count(), 1);

        let failed = &results[1];
        assert_eq!(failed.product_id, "p-missing");
        assert_eq!(failed.error.as_deref(), Some("Product not found"));
        assert!(results[0].success && results[0].error.is_none());
        assert!(results[2].success && results[2].error.is_none());
    }

    #[test]
    fn unmapped_interaction_type_is_a_per_element_failure() {
        let result = element_result(
            "p-1".to_string(),
            Err(ApiError::Validation(
                "Unknown interaction type: hover".to_string(),
            )),
        );

        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("Unknown interaction type: hover")
        );
    }
}
