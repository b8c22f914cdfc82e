//! External service adapters used by the saga.

pub mod payment;
