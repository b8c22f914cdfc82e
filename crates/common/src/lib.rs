//! Shared types used across the order placement engine crates.

pub mod types;

pub use types::{EventId, OrderId, ReservationId, UserId, Version};
