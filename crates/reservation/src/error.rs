//! Error types for the reservation service.

use common::ReservationId;
use store::StoreError;
use thiserror::Error;

/// Errors from hold, confirm, cancel and sweep operations.
#[derive(Debug, Error)]
pub enum ReservationError {
    /// No active or confirmed reservation with this ID.
    #[error("reservation not found: {0}")]
    NotFound(ReservationId),

    /// The underlying ledger operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
