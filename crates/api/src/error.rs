//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::OrderError;
use store::{PlacementError, StoreError};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Order placement error.
    Placement(PlacementError),
    /// Storage layer error.
    Store(StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Placement(err) => placement_error_to_response(err),
            ApiError::Store(err) => store_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn placement_error_to_response(err: PlacementError) -> (StatusCode, String) {
    match &err {
        PlacementError::Order(order_err) => match order_err {
            OrderError::InvalidQuantity(_) => (StatusCode::BAD_REQUEST, err.to_string()),
            OrderError::OutOfStock { .. } | OrderError::InvalidStateTransition { .. } => {
                (StatusCode::CONFLICT, err.to_string())
            }
            OrderError::Price(_) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        },
        PlacementError::Store(store_err) => store_error_to_status(store_err, &err.to_string()),
    }
}

fn store_error_to_response(err: StoreError) -> (StatusCode, String) {
    store_error_to_status(&err, &err.to_string())
}

fn store_error_to_status(err: &StoreError, message: &str) -> (StatusCode, String) {
    match err {
        // Ordering an unknown product is a client mistake.
        StoreError::ProductNotFound(_) => (StatusCode::BAD_REQUEST, message.to_string()),
        StoreError::OrderNotFound(_) => (StatusCode::NOT_FOUND, message.to_string()),
        StoreError::OutOfStock { .. }
        | StoreError::ConcurrencyConflict { .. }
        | StoreError::TooManyConflicts { .. } => (StatusCode::CONFLICT, message.to_string()),
        StoreError::Transaction(_)
        | StoreError::Corrupt(_)
        | StoreError::Serialization(_)
        | StoreError::Database(_) => {
            tracing::error!(error = %message, "internal storage error");
            (StatusCode::INTERNAL_SERVER_ERROR, message.to_string())
        }
    }
}

impl From<PlacementError> for ApiError {
    fn from(err: PlacementError) -> Self {
        ApiError::Placement(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}
