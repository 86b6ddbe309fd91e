//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fulfillment::FulfillmentError;
use ledger::LedgerError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// The request lost to concurrent modifications and may be retried.
    Conflict(String),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<FulfillmentError> for ApiError {
    fn from(err: FulfillmentError) -> Self {
        match &err {
            FulfillmentError::OrderNotFound(_) => ApiError::NotFound(err.to_string()),
            FulfillmentError::InvalidReference { .. }
            | FulfillmentError::OverShipment { .. }
            | FulfillmentError::EmptyShipment => ApiError::BadRequest(err.to_string()),
            FulfillmentError::Contention(_) => ApiError::Conflict(err.to_string()),
            FulfillmentError::Ledger(inner) => ledger_error_to_api(inner, err.to_string()),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let message = err.to_string();
        ledger_error_to_api(&err, message)
    }
}

fn ledger_error_to_api(err: &LedgerError, message: String) -> ApiError {
    match err {
        LedgerError::OrderNotFound(_) | LedgerError::OrderItemNotFound(_) => {
            ApiError::NotFound(message)
        }
        LedgerError::InvalidRecord(_) => ApiError::BadRequest(message),
        LedgerError::ConcurrencyConflict { .. } => ApiError::Conflict(message),
        LedgerError::Database(_) | LedgerError::Migration(_) => ApiError::Internal(message),
    }
}
