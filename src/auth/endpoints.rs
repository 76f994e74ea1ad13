use axum::{
    Json,
    body::Body,
    http::{
        Request,
        header::{COOKIE, SET_COOKIE},
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use email_address::EmailAddress;
use httpdate::fmt_http_date;
use mongodb::Collection;
use serde_json::json;
use std::{
    env::var,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tracing::info;

use super::{
    delegates::{
        email_exists, generate_cookie, hash_password, kill_cookie, retrieve_user_by_cookie,
        retrieve_user_by_email, verify_password,
    },
    schemas::{
        AUTH_COOKIE_NAME, AuthObject, COLLECTIONS_USERS, LoginRequest, RegisterRequest, User,
        UserProfile,
    },
};
use crate::{DB, apex::utils::ApiError};

fn extract_auth_cookie(req: &Request<Body>) -> Option<String> {
    let cookie_header = req.headers().get(COOKIE)?.to_str().ok()?;
    cookie_header.split(';').map(str::trim).find_map(|pair| {
        let mut parts = pair.splitn(2, '=');
        match (parts.next(), parts.next()) {
            (Some(name), Some(value)) if name == AUTH_COOKIE_NAME => Some(value.to_string()),
            _ => None,
        }
    })
}

fn set_cookie_header(auth_object: &AuthObject) -> (axum::http::HeaderName, String) {
    let expire_time =
        UNIX_EPOCH + Duration::from_secs(auth_object.cookie_expire.parse::<u64>().unwrap_or(0));
    let formatted_expire_time = fmt_http_date(SystemTime::from(expire_time));
    let domain = var("DOMAIN").unwrap_or_else(|_| "localhost".to_string());

    (
        SET_COOKIE,
        format!(
            "{}={}; HttpOnly; Path=/; Domain={}; expires={}",
            AUTH_COOKIE_NAME, auth_object.cookie, domain, formatted_expire_time
        ),
    )
}

pub async fn register_user(Json(payload): Json<RegisterRequest>) -> impl IntoResponse {
    if payload.name.trim().is_empty() {
        return ApiError::Validation("Name is required".to_string()).into_response();
    }

    if !EmailAddress::is_valid(&payload.email) {
        return ApiError::Validation("Invalid email format".to_string()).into_response();
    }

    match email_exists(&payload.email).await {
        Some(true) => {
            return ApiError::Validation("Email already taken".to_string()).into_response();
        }
        Some(false) => {}
        None => return ApiError::DatabaseUnavailable.into_response(),
    }

    let Some((hashed_password, salt)) = hash_password(payload.password).await else {
        return ApiError::Validation("Invalid password".to_string()).into_response();
    };

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let user = User {
        uid: uuid::Uuid::new_v4().to_string(),
        name: payload.name,
        email: payload.email,
        password: hashed_password,
        salt,
        is_admin: false,
        permanent_address: None,
        temporary_address: None,
        phone_number: None,
        auth: AuthObject {
            cookie: uuid::Uuid::new_v4().to_string(),
            cookie_expire: "0".to_string(),
        },
        tags: Vec::new(),
        created_at: now,
    };

    let Some(database) = DB.get() else {
        return ApiError::DatabaseUnavailable.into_response();
    };

    let collection: Collection<User> = database.collection(COLLECTIONS_USERS);

    if collection.insert_one(&user).await.is_err() {
        return ApiError::Internal("Failed to create user".to_string()).into_response();
    }

    let Some(auth_object) = generate_cookie(user.uid.clone()).await else {
        return ApiError::Internal("Failed to create session".to_string()).into_response();
    };

    info!(uid = %user.uid, "user registered");

    let headers = [set_cookie_header(&auth_object)];
    (
        headers,
        Json(json!({
            "status": "ok",
            "user": UserProfile::from(&user)
        })),
    )
        .into_response()
}

pub async fn login_user(Json(payload): Json<LoginRequest>) -> impl IntoResponse {
    if !EmailAddress::is_valid(&payload.email) {
        return ApiError::Validation("Invalid email format".to_string()).into_response();
    }

    let Some(user) = retrieve_user_by_email(&payload.email).await else {
        return ApiError::Validation("Invalid email or password".to_string()).into_response();
    };

    if !verify_password(payload.password, user.salt.clone(), user.password.clone()).await {
        return ApiError::Validation("Invalid email or password".to_string()).into_response();
    }

    let Some(auth_object) = generate_cookie(user.uid.clone()).await else {
        return ApiError::Internal("Failed to create session".to_string()).into_response();
    };

    let headers = [set_cookie_header(&auth_object)];
    (
        headers,
        Json(json!({
            "status": "ok",
            "user": UserProfile::from(&user)
        })),
    )
        .into_response()
}

pub async fn logout_user(req: Request<Body>) -> impl IntoResponse {
    if let Some(user) = req.extensions().get::<User>() {
        if kill_cookie(user.auth.cookie.clone()).await {
            let domain = var("DOMAIN").unwrap_or_else(|_| "localhost".to_string());
            let headers = [(
                SET_COOKIE,
                format!(
                    "{}=null; expires=Thu, 01 Jan 1970 00:00:00 GMT; Path=/; Domain={}; HttpOnly",
                    AUTH_COOKIE_NAME, domain
                ),
            )];
            return (headers, Json(json!({ "status": "ok" }))).into_response();
        }
    }

    ApiError::Unauthorized.into_response()
}

pub async fn get_user(req: Request<Body>) -> impl IntoResponse {
    if let Some(user) = req.extensions().get::<User>() {
        return Json(json!({
            "user": UserProfile::from(user),
        }))
        .into_response();
    }

    ApiError::Unauthorized.into_response()
}

/// Rejects the request unless a valid, unexpired session cookie is present.
pub async fn cookie_auth(mut req: Request<Body>, next: Next) -> Result<Response, ApiError> {
    if DB.get().is_none() {
        return Err(ApiError::DatabaseUnavailable);
    }

    if let Some(cookie) = extract_auth_cookie(&req) {
        if let Some(user) = retrieve_user_by_cookie(&cookie).await {
            req.extensions_mut().insert(user);
            return Ok(next.run(req).await);
        }
    }

    Err(ApiError::Unauthorized)
}

/// Attaches the caller's identity when a valid session cookie is present and
/// lets the request through either way. Used on the recommendation surface,
/// where anonymous callers are first-class.
pub async fn optional_auth(mut req: Request<Body>, next: Next) -> Response {
    if let Some(cookie) = extract_auth_cookie(&req) {
        if let Some(user) = retrieve_user_by_cookie(&cookie).await {
            req.extensions_mut().insert(user);
        }
    }

    next.run(req).await
}
