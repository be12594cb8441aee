//! Unified error handling for the ABAC engine

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Policy not found: {0}")]
    PolicyNotFound(String),

    #[error("Duplicate policy: {0}")]
    DuplicatePolicy(String),

    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    #[error("Policy evaluation failed: {0}")]
    EvaluationFailed(String),

    #[error("Attribute not found: {0}")]
    AttributeNotFound(String),

    #[error("Invalid attribute type: {0}")]
    InvalidAttributeType(String),

    #[error("Attribute provider {provider} failed: {message}")]
    AttributeProvider { provider: String, message: String },

    #[error("Policy store error: {0}")]
    Store(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::AttributeProvider {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AppError::PolicyNotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::DuplicatePolicy(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            AppError::InvalidPolicy(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_policy", msg.clone())
            }
            AppError::InvalidCondition(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_condition", msg.clone())
            }
            AppError::AttributeNotFound(msg) => {
                (StatusCode::BAD_REQUEST, "attribute_not_found", msg.clone())
            }
            AppError::InvalidAttributeType(msg) => (
                StatusCode::BAD_REQUEST,
                "invalid_attribute_type",
                msg.clone(),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            AppError::Validation(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "validation", msg.clone())
            }
            AppError::EvaluationFailed(msg) => {
                tracing::error!("Policy evaluation failed: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "evaluation_failed",
                    "Policy evaluation failed".to_string(),
                )
            }
            AppError::AttributeProvider { provider, message } => {
                tracing::error!(provider = %provider, "Attribute provider error: {}", message);
                (
                    StatusCode::BAD_GATEWAY,
                    "attribute_provider_error",
                    "Attribute provider error".to_string(),
                )
            }
            AppError::Store(msg) => {
                tracing::error!("Policy store error: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "store_error",
                    "Policy store unavailable".to_string(),
                )
            }
            AppError::Config(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "config_error",
                    "Service misconfigured".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details: None,
        });

        (status, body).into_response()
    }
}

// Conversion from validation errors
impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidPolicy(err.to_string())
    }
}
