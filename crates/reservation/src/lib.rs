//! Reservation service: TTL-bounded stock holds for the saga path.
//!
//! A hold moves stock out of the sellable pool without touching any
//! order. Holds end in exactly one of three ways: confirmed (stock
//! stays gone), cancelled (stock returned), or expired by the sweeper
//! (stock returned and a `ReservationExpired` event emitted).

pub mod error;
pub mod service;
pub mod sweeper;
pub mod worker;

pub use error::ReservationError;
pub use service::{DEFAULT_TTL, Reservation, ReservationService};
pub use sweeper::{DEFAULT_SWEEP_INTERVAL, Sweeper};
pub use worker::ReservationWorker;
