//! Storage layer for the order placement engine.
//!
//! Provides the inventory ledger with compare-and-swap stock updates,
//! the unit-of-work transaction manager, the transactional outbox with
//! its dispatcher, the in-process event channel, and the placement
//! service that ties them together. Two backends implement the store
//! traits: [`InMemoryStore`] and [`PostgresStore`].

pub mod channel;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod order_store;
pub mod outbox;
pub mod placement;
pub mod postgres;
pub mod txn;

pub use channel::{EventChannel, EventHandler, HandlerError, InMemoryEventChannel};
pub use error::{Result, StoreError};
pub use ledger::{InventoryLedger, InventoryLedgerExt, MAX_RESERVE_ATTEMPTS};
pub use memory::InMemoryStore;
pub use order_store::OrderStore;
pub use outbox::{OutboxDispatcher, OutboxRecord};
pub use placement::{CreateOrder, PlacementError, PlacementService};
pub use postgres::PostgresStore;
pub use txn::{COMMIT_TIMEOUT, Transaction, TransactionManager};
