//! Placement saga for flash-sale orders.
//!
//! The orchestrator consumes placement events and advances one saga
//! instance per order through reserve, charge and confirm steps,
//! compensating (releasing the hold, cancelling the order) when a step
//! fails. Delivery is at-least-once; every transition is keyed by the
//! triggering event's ID so replays are no-ops.

pub mod error;
pub mod instance;
pub mod orchestrator;
pub mod services;
pub mod state;

pub use error::SagaError;
pub use instance::SagaInstance;
pub use orchestrator::SagaOrchestrator;
pub use services::payment::{
    CircuitBreaker, InMemoryPaymentGateway, PaymentAdapter, PaymentError, PaymentGateway,
    RetrySchedule,
};
pub use state::SagaState;
