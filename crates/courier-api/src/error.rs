//! Courier API — error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use courier_core::error::{CourierError, StorageError};
use serde::Serialize;
use thiserror::Error;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage could not be reached at startup.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Client assembly, open or close failed.
    #[error("client error: {0}")]
    Client(#[from] CourierError),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer errors that implement `IntoResponse`.
#[derive(Debug)]
pub enum ApiError {
    /// Dispatch or registration failed.
    Courier(CourierError),
    /// The projection has no view for this account.
    AccountNotFound(String),
}

impl From<CourierError> for ApiError {
    fn from(err: CourierError) -> Self {
        Self::Courier(err)
    }
}

fn classify(err: &CourierError) -> (StatusCode, &'static str) {
    match err {
        CourierError::UnknownCommand(_) => (StatusCode::NOT_FOUND, "unknown_command"),
        CourierError::DomainRuleViolation(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "domain_rule_violation")
        }
        CourierError::Deserialization { .. } => (StatusCode::BAD_REQUEST, "invalid_payload"),
        CourierError::Storage(StorageError::ConcurrencyConflict { .. }) => {
            (StatusCode::CONFLICT, "concurrency_conflict")
        }
        CourierError::Broker(_) => (StatusCode::BAD_GATEWAY, "broker_error"),
        CourierError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
        CourierError::DuplicateCommandRegistration(_)
        | CourierError::MissingAggregateId
        | CourierError::Serialization(_)
        | CourierError::Configuration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            Self::Courier(err) => {
                let (status, code) = classify(err);
                (status, code, err.to_string())
            }
            Self::AccountNotFound(id) => (
                StatusCode::NOT_FOUND,
                "account_not_found",
                format!("account not found: {id}"),
            ),
        };

        if status.is_server_error() {
            tracing::error!(status = %status, error = error_code, %message, "request failed");
        }

        let body = ErrorBody {
            error: error_code,
            message,
        };

        (status, Json(body)).into_response()
    }
}
