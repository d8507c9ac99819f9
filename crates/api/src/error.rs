//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::auth::SmsError;

/// Errors returned by route handlers outside the login pipeline
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Resource not found")]
    NotFound,
    #[error("Verification code could not be delivered")]
    DeliveryFailed,
    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::DeliveryFailed => (StatusCode::BAD_GATEWAY, "DELIVERY_FAILED"),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

impl From<SmsError> for ApiError {
    fn from(err: SmsError) -> Self {
        tracing::error!(error = %err, "SMS delivery failed");
        ApiError::DeliveryFailed
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
