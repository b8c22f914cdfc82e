//! Domain model for the order placement engine.
//!
//! Contains the value objects (money, quantity, product identity), the
//! product inventory record, the order aggregate with its lifecycle,
//! and the placement event schema shared by the outbox and the saga.

pub mod events;
pub mod order;
pub mod product;
pub mod value_objects;

pub use events::{EventKind, PlacementEvent};
pub use order::{Order, OrderError, OrderStatus};
pub use product::Product;
pub use value_objects::{Currency, InvalidQuantity, Money, MoneyError, ProductId, Quantity};
