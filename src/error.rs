//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::{AmountError, DomainError};
use crate::identifier::IdentifierError;
use crate::ledger::LedgerError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    InvalidIdentifier(#[from] IdentifierError),

    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),

    #[error("Missing required header: {0}")]
    MissingHeader(String),

    #[error("A request with this idempotency key is still in progress")]
    IdempotencyInProgress,

    #[error("Idempotency key was already used with a different request")]
    IdempotencyKeyReused,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    // Domain errors
    #[error(transparent)]
    Domain(DomainError),

    // Ledger store errors (status depends on the kind)
    #[error(transparent)]
    Ledger(LedgerError),

    // Server errors (5xx)
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidAmount(e) => AppError::InvalidAmount(e),
            DomainError::InvalidIdentifier(e) => AppError::InvalidIdentifier(e),
            other => AppError::Domain(other),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Domain(e) => e.into(),
            other => AppError::Ledger(other),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AppError {
    /// HTTP status and stable error code
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            // 400 Bad Request
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            AppError::InvalidIdentifier(IdentifierError::InvalidFormat(_)) => {
                (StatusCode::BAD_REQUEST, "invalid_format")
            }
            AppError::InvalidIdentifier(IdentifierError::InvalidLength { .. }) => {
                (StatusCode::BAD_REQUEST, "invalid_length")
            }
            AppError::InvalidAmount(_) => (StatusCode::BAD_REQUEST, "invalid_amount"),
            AppError::MissingHeader(_) => (StatusCode::BAD_REQUEST, "missing_header"),

            // 409 Conflict
            AppError::IdempotencyInProgress => (StatusCode::CONFLICT, "idempotency_in_progress"),

            // 422 Unprocessable Entity
            AppError::IdempotencyKeyReused => {
                (StatusCode::UNPROCESSABLE_ENTITY, "idempotency_key_reused")
            }

            // 429 Too Many Requests
            AppError::RateLimitExceeded => (StatusCode::TOO_MANY_REQUESTS, "rate_limit_exceeded"),

            AppError::Domain(domain_err) => match domain_err {
                DomainError::InsufficientFunds { .. } => {
                    (StatusCode::BAD_REQUEST, "insufficient_funds")
                }
                DomainError::AccountClosed(_) => (StatusCode::BAD_REQUEST, "account_closed"),
                DomainError::SameAccount => (StatusCode::BAD_REQUEST, "same_account"),
                DomainError::InvalidAmount(_) => (StatusCode::BAD_REQUEST, "invalid_amount"),
                DomainError::InvalidIdentifier(_) => (StatusCode::BAD_REQUEST, "invalid_format"),
                DomainError::InvalidValue(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            },

            AppError::Ledger(ledger_err) => match ledger_err {
                LedgerError::Domain(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
                LedgerError::AccountNotFound(_) => (StatusCode::NOT_FOUND, "account_not_found"),
                LedgerError::UserNotFound(_) => (StatusCode::NOT_FOUND, "user_not_found"),
                LedgerError::InvalidLimit(_) => (StatusCode::BAD_REQUEST, "invalid_limit"),
                LedgerError::UserAlreadyExists(_) => (StatusCode::CONFLICT, "user_already_exists"),
                LedgerError::ConflictRetryable(_) => (StatusCode::CONFLICT, "conflict_retryable"),
                LedgerError::StoreUnavailable(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable")
                }
                LedgerError::CorruptData(_) => (StatusCode::INTERNAL_SERVER_ERROR, "corrupt_data"),
                LedgerError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            },

            // 500 Internal Server Error
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            AppError::InvalidRequest(msg) | AppError::MissingHeader(msg) => Some(msg.clone()),
            AppError::InvalidIdentifier(e) => Some(e.to_string()),
            AppError::Domain(DomainError::InsufficientFunds {
                required,
                available,
                ..
            }) => Some(format!("required {}, available {}", required, available)),
            AppError::Ledger(
                LedgerError::AccountNotFound(id)
                | LedgerError::UserNotFound(id)
                | LedgerError::UserAlreadyExists(id),
            ) => Some(id.clone()),
            AppError::Ledger(LedgerError::InvalidLimit(msg)) => Some(msg.clone()),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();

        // Server-side failures are logged here; details never leave the process.
        let error = if status.is_server_error() {
            tracing::error!(error_code = error_code, error = %self, "Request failed");
            match status {
                StatusCode::SERVICE_UNAVAILABLE => "Service temporarily unavailable".to_string(),
                _ => "Internal server error".to_string(),
            }
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error,
            error_code: error_code.to_string(),
            details: self.details(),
        };

        (status, Json(body)).into_response()
    }
}
