//! Error types for saga execution.

use common::OrderId;
use domain::OrderError;
use store::StoreError;
use thiserror::Error;

use crate::state::SagaState;

/// Errors from saga transitions and step execution.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The triggering event does not fit the saga's current state.
    #[error("invalid transition for order {order_id}: cannot {action} while {state}")]
    InvalidTransition {
        order_id: OrderId,
        state: SagaState,
        action: &'static str,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Order(#[from] OrderError),
}
