//! Error types for mangalink
//!
//! Core taxonomy lives next to the code that produces it
//! ([`crate::services::upstream::UpstreamError`], [`crate::cache::StoreError`]);
//! this module maps everything to the HTTP boundary. Callers receive a
//! generic classification, never raw upstream response bodies.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::upstream::UpstreamError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - e.g., sync already running, duplicate link
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Upstream platform failure, surfaced after retries are exhausted
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Upstream(ref err) => match err {
                UpstreamError::NotFound { platform, resource } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{} has no entity {}", platform, resource),
                ),
                UpstreamError::AuthExpired(platform) => (
                    StatusCode::UNAUTHORIZED,
                    "AUTH_EXPIRED",
                    format!("{} credential expired", platform),
                ),
                // Detailed causes stay in logs; the caller gets the classification only.
                UpstreamError::Transient { platform, .. } => (
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM_UNAVAILABLE",
                    format!("{} is temporarily unavailable", platform),
                ),
                UpstreamError::Parse { platform, .. } => (
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM_INVALID",
                    format!("{} returned an unreadable response", platform),
                ),
            },
            // The cause stays in the log; the body never echoes storage internals.
            ApiError::Database(ref err) => {
                tracing::error!(error = %err, "Database error at the API boundary");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Internal storage failure".to_string(),
                )
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Other(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn database_errors_keep_details_out_of_the_body() {
        let response = ApiError::Database(sqlx::Error::RowNotFound).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "DATABASE_ERROR");
        assert_eq!(body["error"]["message"], "Internal storage failure");
    }
}
