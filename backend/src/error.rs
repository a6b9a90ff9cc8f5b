//! Error handling for the skywatch pipeline
//!
//! One taxonomy shared by every binary; the axum response mapping is only
//! exercised by the query server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Storage errors
    #[error("Duplicate location: {0}")]
    DuplicateLocation(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation error: {field}: {message}")]
    Validation { field: String, message: String },

    // Upstream weather API errors
    #[error("Weather API rate limited: {0}")]
    RateLimited(String),

    #[error("Weather API error: {0}")]
    WeatherApi(String),

    #[error("Decode error: {0}")]
    Decode(String),

    // Stream errors
    #[error("Stream error: {0}")]
    Stream(#[from] redis::RedisError),

    #[error("Timeout waiting for ML results for job {job_id}")]
    MlTimeout { job_id: String },

    #[error("Operation cancelled")]
    Cancelled,

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Classify an upstream failure as retryable rate limiting.
    ///
    /// Structured classification (the client maps HTTP 429 to
    /// `RateLimited`) comes first; the message-substring check remains as
    /// a fallback for opaque proxies that surface the limit in the body.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            AppError::RateLimited(_) => true,
            AppError::WeatherApi(msg) => msg.contains("429") || msg.contains("Too many"),
            _ => false,
        }
    }

    /// Whether a storage failure is worth one retry (pool saturation,
    /// connection loss) as opposed to a permanent error.
    pub fn is_transient_storage(&self) -> bool {
        matches!(
            self,
            AppError::Database(sqlx::Error::PoolTimedOut)
                | AppError::Database(sqlx::Error::Io(_))
                | AppError::Database(sqlx::Error::PoolClosed)
        )
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            AppError::DuplicateLocation(name) => (
                StatusCode::CONFLICT,
                ErrorDetail {
                    code: "DUPLICATE_LOCATION".to_string(),
                    message: format!("A location named {} already exists", name),
                    field: Some("name".to_string()),
                },
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail {
                    code: "NOT_FOUND".to_string(),
                    message: format!("{} not found", resource),
                    field: None,
                },
            ),
            AppError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    code: "VALIDATION_ERROR".to_string(),
                    message: message.clone(),
                    field: Some(field.clone()),
                },
            ),
            AppError::RateLimited(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorDetail {
                    code: "UPSTREAM_RATE_LIMITED".to_string(),
                    message: msg.clone(),
                    field: None,
                },
            ),
            AppError::WeatherApi(msg) => (
                StatusCode::BAD_GATEWAY,
                ErrorDetail {
                    code: "WEATHER_API_ERROR".to_string(),
                    message: msg.clone(),
                    field: None,
                },
            ),
            AppError::Decode(msg) => (
                StatusCode::BAD_GATEWAY,
                ErrorDetail {
                    code: "DECODE_ERROR".to_string(),
                    message: msg.clone(),
                    field: None,
                },
            ),
            AppError::Stream(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorDetail {
                    code: "STREAM_ERROR".to_string(),
                    message: "Stream service unavailable".to_string(),
                    field: None,
                },
            ),
            AppError::MlTimeout { job_id } => (
                StatusCode::GATEWAY_TIMEOUT,
                ErrorDetail {
                    code: "ML_TIMEOUT".to_string(),
                    message: format!("No ML response for job {}", job_id),
                    field: None,
                },
            ),
            AppError::Cancelled => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorDetail {
                    code: "CANCELLED".to_string(),
                    message: "Operation cancelled".to_string(),
                    field: None,
                },
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "DATABASE_ERROR".to_string(),
                    message: "A database error occurred".to_string(),
                    field: None,
                },
            ),
            AppError::Configuration(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "CONFIGURATION_ERROR".to_string(),
                    message: msg.clone(),
                    field: None,
                },
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "INTERNAL_ERROR".to_string(),
                    message: "An internal server error occurred".to_string(),
                    field: None,
                },
            ),
        };

        tracing::error!("Error: {:?}", self);

        (status, Json(ErrorResponse { error: detail })).into_response()
    }
}

/// Result type alias used throughout the pipeline
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_classification_is_structured_first() {
        assert!(AppError::RateLimited("429".into()).is_rate_limited());
        assert!(AppError::WeatherApi("status 429, body: slow down".into()).is_rate_limited());
        assert!(AppError::WeatherApi("Too many requests".into()).is_rate_limited());
        assert!(!AppError::WeatherApi("status 500".into()).is_rate_limited());
        assert!(!AppError::Decode("bad json".into()).is_rate_limited());
    }

    #[test]
    fn transient_storage_classification() {
        assert!(AppError::Database(sqlx::Error::PoolTimedOut).is_transient_storage());
        assert!(!AppError::Database(sqlx::Error::RowNotFound).is_transient_storage());
        assert!(!AppError::NotFound("Location".into()).is_transient_storage());
    }
}
