use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Serialize)]
pub struct ErrorMessage {
    pub status: &'static str,
    pub message: String,
}

impl ErrorMessage {
    #[inline]
    pub fn new(message: String) -> Self {
        Self {
            status: "error",
            message,
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Admin access required")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Database unavailable")]
    DatabaseUnavailable,

    #[error("Database error")]
    Database(#[from] mongodb::error::Error),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::DatabaseUnavailable | Self::Database(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Raw driver errors stay in the logs, not in client responses.
        let message = match &self {
            Self::Database(e) => {
                tracing::error!(error = %e, "database operation failed");
                "Database error".to_string()
            }
            other => other.to_string(),
        };

        (status, axum::Json(ErrorMessage::new(message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let err = ApiError::Validation("bad payload".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "bad payload");
    }

    #[test]
    fn not_found_names_the_resource() {
        let err = ApiError::NotFound("Product");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Product not found");
    }
}
