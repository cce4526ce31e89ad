//! Error handling for the field materials service
//!
//! Every failure becomes a JSON body `{ "error": { code, message, field? } }`
//! with a status chosen so clients can tell "fix your input" from "reload
//! and retry".

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::DomainError;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Insufficient permissions: {0}")]
    Forbidden(String),

    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    // Ledger and reconciliation rules
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // External service errors
    #[error("Alert webhook error: {0}")]
    AlertDelivery(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    /// A stored value the domain layer does not recognise
    pub fn corrupt(what: &str, detail: impl std::fmt::Display) -> Self {
        AppError::Internal(format!("Unreadable {} in storage: {}", what, detail))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        match errors.field_errors().into_iter().next() {
            Some((field, errs)) => AppError::Validation {
                field: field.to_string(),
                message: errs
                    .first()
                    .and_then(|e| e.message.as_ref())
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{} is invalid", field)),
            },
            None => AppError::ValidationError(errors.to_string()),
        }
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

impl ErrorDetail {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            field: None,
        }
    }
}

fn domain_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::InsufficientStock { .. } | DomainError::StateTransition { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        DomainError::QuantityMismatch { .. } | DomainError::InvalidQuantity(_) => {
            StatusCode::BAD_REQUEST
        }
        DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
        DomainError::ConcurrencyConflict { .. } | DomainError::NegativeStock { .. } => {
            StatusCode::CONFLICT
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match &self {
            AppError::InvalidToken(msg) => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("INVALID_TOKEN", msg.clone()),
            ),
            AppError::Forbidden(msg) => (
                StatusCode::FORBIDDEN,
                ErrorDetail::new("INSUFFICIENT_PERMISSIONS", msg.clone()),
            ),
            AppError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    field: Some(field.clone()),
                    ..ErrorDetail::new("VALIDATION_ERROR", message.clone())
                },
            ),
            AppError::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", msg.clone()),
            ),
            AppError::Domain(err) => (domain_status(err), ErrorDetail::new(err.code(), err.to_string())),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new("NOT_FOUND", format!("{} not found", resource)),
            ),
            AppError::AlertDelivery(msg) => (
                StatusCode::BAD_GATEWAY,
                ErrorDetail::new("ALERT_DELIVERY_ERROR", msg.clone()),
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("DATABASE_ERROR", "A database error occurred"),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", msg.clone()),
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", "An internal server error occurred"),
            ),
        };

        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::warn!(code = %error_detail.code, "Rejected request: {}", self);
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_domain_errors_map_to_statuses() {
        let conflict = AppError::from(DomainError::ConcurrencyConflict {
            resource: "control".to_string(),
        });
        assert_eq!(conflict.into_response().status(), StatusCode::CONFLICT);

        let missing = AppError::from(DomainError::NotFound {
            resource: "Material",
            id: Uuid::new_v4(),
        });
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);

        let mismatch = AppError::from(DomainError::QuantityMismatch {
            material_id: Uuid::new_v4(),
            message: "sum".to_string(),
        });
        assert_eq!(mismatch.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
