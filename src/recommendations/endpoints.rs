use axum::{
    Json,
    body::Body,
    extract::{Extension, Query},
    http::Request,
    response::IntoResponse,
};
use serde_json::json;

use super::{
    delegates::{
        CallerIdentity, TrackOutcome, add_tags_if_absent, batch_track, get_recommendations,
        record_interaction,
    },
    schemas::{
        BatchTrackRequest, InteractionKind, RecommendationQuery, SESSION_ID_HEADER, Strategy,
        TrackRequest, UpdateTagsRequest,
    },
};
use crate::{apex::utils::ApiError, auth::schemas::User, config::config};

fn caller_identity(req: &Request<Body>) -> CallerIdentity {
    let user = req.extensions().get::<User>().cloned();
    let session_id = req
        .headers()
        .get(SESSION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    CallerIdentity { user, session_id }
}

async fn read_json_body<T: serde::de::DeserializeOwned>(
    req: Request<Body>,
) -> Result<(T, CallerIdentity), ApiError> {
    let caller = caller_identity(&req);

    let body_bytes = axum::body::to_bytes(req.into_body(), usize::MAX)
        .await
        .map_err(|_| ApiError::Validation("Failed to read request body".to_string()))?;

    let payload = serde_json::from_slice(&body_bytes)
        .map_err(|err| ApiError::Validation(format!("Invalid payload: {}", err)))?;

    Ok((payload, caller))
}

pub async fn get_recommendations_endpoint(
    Query(query): Query<RecommendationQuery>,
    req: Request<Body>,
) -> impl IntoResponse {
    let cfg = config();
    let caller = caller_identity(&req);

    let strategy = match query.strategy.as_deref() {
        None => Strategy::Hybrid,
        Some(raw) => match Strategy::parse(raw) {
            Some(strategy) => strategy,
            None => {
                return ApiError::Validation(format!("Unknown strategy: {}", raw)).into_response();
            }
        },
    };

    let limit = query
        .limit
        .unwrap_or(cfg.default_limit)
        .clamp(1, cfg.max_limit) as usize;

    let exclude_ids: Vec<String> = query
        .exclude_ids
        .as_deref()
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();

    match get_recommendations(caller.user.as_ref(), strategy, limit, exclude_ids).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn track_interaction_endpoint(req: Request<Body>) -> impl IntoResponse {
    let (payload, caller): (TrackRequest, _) = match read_json_body(req).await {
        Ok(parsed) => parsed,
        Err(err) => return err.into_response(),
    };

    if payload.product_id.trim().is_empty() {
        return ApiError::Validation("Product ID and type are required".to_string())
            .into_response();
    }

    let Some(kind) = InteractionKind::parse(&payload.kind) else {
        return ApiError::Validation(format!("Unknown interaction type: {}", payload.kind))
            .into_response();
    };

    match record_interaction(&caller, &payload.product_id, kind, payload.event_id).await {
        Ok(TrackOutcome::Recorded) => Json(json!({
            "success": true,
            "message": "Interaction tracked"
        }))
        .into_response(),
        Ok(TrackOutcome::UnknownProduct) => Json(json!({
            "success": true,
            "message": "Interaction dropped"
        }))
        .into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn batch_track_endpoint(req: Request<Body>) -> impl IntoResponse {
    let (payload, caller): (BatchTrackRequest, _) = match read_json_body(req).await {
        Ok(parsed) => parsed,
        Err(err) => return err.into_response(),
    };

    match batch_track(&caller, payload.interactions).await {
        Ok(results) => Json(json!({
            "success": true,
            "message": "Batch tracking completed",
            "results": results
        }))
        .into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn update_user_tags_endpoint(
    Extension(user): Extension<User>,
    Json(payload): Json<UpdateTagsRequest>,
) -> impl IntoResponse {
    match add_tags_if_absent(&user.uid, &payload.tags).await {
        Ok(()) => Json(json!({ "message": "Tags updated successfully" })).into_response(),
        Err(err) => err.into_response(),
    }
}
