//! Error types for the storage layer.

use common::{OrderId, Version};
use domain::ProductId;
use thiserror::Error;

/// Errors that can occur in ledger, outbox and transaction operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No product exists with the given ID.
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    /// No order exists with the given ID.
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// Stock does not cover the requested quantity.
    #[error("insufficient stock for {product_id}: available {available}, requested {requested}")]
    OutOfStock {
        product_id: ProductId,
        available: u32,
        requested: u32,
    },

    /// The product version changed between read and write.
    #[error(
        "concurrency conflict on {product_id}: expected version {expected}, actual {actual}"
    )]
    ConcurrencyConflict {
        product_id: ProductId,
        expected: Version,
        actual: Version,
    },

    /// Repeated compare-and-swap attempts kept losing the race.
    #[error("gave up on {product_id} after {attempts} conflicting attempts")]
    TooManyConflicts { product_id: ProductId, attempts: u32 },

    /// The unit of work could not be started or committed.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// A stored row could not be mapped back to a domain value.
    #[error("corrupt store record: {0}")]
    Corrupt(String),

    /// Event payload (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Returns true for errors a caller may resolve by retrying with
    /// fresh state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::ConcurrencyConflict { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_is_retryable() {
        let err = StoreError::ConcurrencyConflict {
            product_id: ProductId::new("SKU-001"),
            expected: Version::new(3),
            actual: Version::new(4),
        };
        assert!(err.is_retryable());
        assert!(
            err.to_string()
                .contains("expected version 3, actual 4")
        );
    }

    #[test]
    fn exhaustion_is_not_retryable() {
        let err = StoreError::TooManyConflicts {
            product_id: ProductId::new("SKU-001"),
            attempts: 3,
        };
        assert!(!err.is_retryable());
    }
}
