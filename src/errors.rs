use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Not Found", "Conflict")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Additional detail, e.g. the offending field of a validation error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error on '{field}': {message}")]
    ValidationError { field: String, message: String },

    /// Cart and catalog disagree on what the order should cost. Fatal for
    /// the draft: checkout must restart from a refreshed cart.
    #[error("Price mismatch: cart total {expected} but catalog total {confirmed}")]
    PriceMismatch { expected: Decimal, confirmed: Decimal },

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Payment verification timed out for order {0}")]
    VerificationTimeout(Uuid),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    fn status_and_label(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "Not Found"),
            Self::ValidationError { .. } => (StatusCode::BAD_REQUEST, "Bad Request"),
            Self::InvalidOperation(_) => (StatusCode::BAD_REQUEST, "Bad Request"),
            Self::PriceMismatch { .. } => (StatusCode::CONFLICT, "Conflict"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "Conflict"),
            Self::AuthError(_) => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "Forbidden"),
            Self::GatewayUnavailable(_) => (StatusCode::BAD_GATEWAY, "Bad Gateway"),
            Self::VerificationTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "Gateway Timeout"),
            Self::DatabaseError(_) | Self::InternalError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, label) = self.status_and_label();

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let details = match &self {
            ServiceError::ValidationError { field, .. } => Some(format!("field: {field}")),
            _ => None,
        };

        let body = ErrorResponse {
            error: label.to_string(),
            message: self.to_string(),
            details,
            timestamp: Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let (field, message) = errors
            .field_errors()
            .into_iter()
            .next()
            .map(|(field, errs)| {
                let msg = errs
                    .first()
                    .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| "invalid value".to_string());
                (field.to_string(), msg)
            })
            .unwrap_or_else(|| ("unknown".to_string(), "invalid input".to_string()));
        Self::ValidationError { field, message }
    }
}
