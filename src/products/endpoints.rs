use axum::{
    Json,
    extract::{Extension, Path, Query},
    response::IntoResponse,
};
use serde_json::json;

use super::{
    delegates::{create_product, delete_product, get_product_by_id, list_products, update_product},
    schemas::{CreateProductRequest, ListProductsQuery, UpdateProductRequest},
};
use crate::{apex::utils::ApiError, auth::schemas::User};

#[inline]
fn require_admin(user: &User) -> Result<(), ApiError> {
    if user.is_admin {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

pub async fn create_product_endpoint(
    Extension(user): Extension<User>,
    Json(payload): Json<CreateProductRequest>,
) -> impl IntoResponse {
    if let Err(err) = require_admin(&user) {
        return err.into_response();
    }

    match create_product(payload).await {
        Ok(product) => Json(json!({
            "status": "ok",
            "product": product
        }))
        .into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn get_product_endpoint(Path(product_id): Path<String>) -> impl IntoResponse {
    match get_product_by_id(&product_id).await {
        Ok(product) => Json(json!({
            "status": "ok",
            "product": product
        }))
        .into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn list_products_endpoint(Query(query): Query<ListProductsQuery>) -> impl IntoResponse {
    match list_products(query).await {
        Ok(products) => Json(json!({
            "status": "ok",
            "products": products
        }))
        .into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn update_product_endpoint(
    Extension(user): Extension<User>,
    Path(product_id): Path<String>,
    Json(payload): Json<UpdateProductRequest>,
) -> impl IntoResponse {
    if let Err(err) = require_admin(&user) {
        return err.into_response();
    }

    match update_product(&product_id, payload).await {
        Ok(product) => Json(json!({
            "status": "ok",
            "product": product
        }))
        .into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn delete_product_endpoint(
    Extension(user): Extension<User>,
    Path(product_id): Path<String>,
) -> impl IntoResponse {
    if let Err(err) = require_admin(&user) {
        return err.into_response();
    }

    match delete_product(&product_id).await {
        Ok(()) => Json(json!({
            "status": "ok",
            "message": "Product deactivated"
        }))
        .into_response(),
        Err(err) => err.into_response(),
    }
}
