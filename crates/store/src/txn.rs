//! Unit-of-work transaction manager for the in-memory backend.
//!
//! Writes made inside a transaction closure are staged against a
//! snapshot view of the store and applied to the shared state only when
//! the closure returns `Ok`. An `Err` return, or a panic inside the
//! closure, leaves the shared state untouched.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{EventId, OrderId, Version};
use domain::{Order, PlacementEvent, Product, ProductId, Quantity};
use tokio::sync::Mutex;

use crate::error::{Result, StoreError};
use crate::outbox::OutboxRecord;

/// How long a transaction waits to begin before failing.
pub const COMMIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Backing state shared by all transactions of one store.
#[derive(Debug, Default)]
pub(crate) struct StoreState {
    pub(crate) products: HashMap<ProductId, Product>,
    pub(crate) orders: HashMap<OrderId, Order>,
    pub(crate) outbox: Vec<OutboxRecord>,
    pub(crate) released: HashSet<String>,
    pub(crate) sagas: HashMap<OrderId, serde_json::Value>,
    next_sequence: i64,
}

/// Serializes units of work over a shared [`StoreState`].
#[derive(Debug, Clone, Default)]
pub struct TransactionManager {
    state: Arc<Mutex<StoreState>>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` as one atomic unit of work.
    ///
    /// All writes staged by `f` are applied together after it returns
    /// `Ok`; on `Err` or panic nothing is applied.
    pub async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T>,
    {
        let mut guard = tokio::time::timeout(COMMIT_TIMEOUT, self.state.lock())
            .await
            .map_err(|_| {
                StoreError::Transaction(format!(
                    "could not begin within {}s",
                    COMMIT_TIMEOUT.as_secs()
                ))
            })?;

        let (value, staged) = {
            let mut txn = Transaction::new(&guard);
            let value = f(&mut txn)?;
            (value, txn.into_staged())
        };
        staged.apply(&mut guard);
        Ok(value)
    }

    /// Runs a read-only closure against the current state.
    pub(crate) async fn read<T>(&self, f: impl FnOnce(&StoreState) -> T) -> Result<T> {
        let guard = tokio::time::timeout(COMMIT_TIMEOUT, self.state.lock())
            .await
            .map_err(|_| {
                StoreError::Transaction(format!(
                    "could not begin within {}s",
                    COMMIT_TIMEOUT.as_secs()
                ))
            })?;
        Ok(f(&guard))
    }
}

/// Writes staged by a transaction, applied on commit.
#[derive(Debug, Default)]
struct Staged {
    products: HashMap<ProductId, Product>,
    orders: HashMap<OrderId, Order>,
    events: Vec<OutboxRecord>,
    published: Vec<EventId>,
    released: HashSet<String>,
    sagas: HashMap<OrderId, serde_json::Value>,
}

impl Staged {
    fn apply(self, state: &mut StoreState) {
        state.products.extend(self.products);
        state.orders.extend(self.orders);
        state.released.extend(self.released);
        state.sagas.extend(self.sagas);
        for mut record in self.events {
            state.next_sequence += 1;
            record.sequence = state.next_sequence;
            state.outbox.push(record);
        }
        for event_id in self.published {
            for record in state
                .outbox
                .iter_mut()
                .filter(|r| r.event_id == event_id && r.published_at.is_none())
            {
                record.published_at = Some(Utc::now());
            }
        }
    }
}

/// A unit of work over the store.
///
/// Reads see committed state overlaid with this transaction's own
/// staged writes.
pub struct Transaction<'a> {
    base: &'a StoreState,
    staged: Staged,
}

impl<'a> Transaction<'a> {
    fn new(base: &'a StoreState) -> Self {
        Self {
            base,
            staged: Staged::default(),
        }
    }

    fn into_staged(self) -> Staged {
        self.staged
    }

    /// Reads a product, preferring this transaction's staged copy.
    pub fn product(&self, product_id: &ProductId) -> Result<Product> {
        self.staged
            .products
            .get(product_id)
            .or_else(|| self.base.products.get(product_id))
            .cloned()
            .ok_or_else(|| StoreError::ProductNotFound(product_id.clone()))
    }

    /// Stages a product insert or replacement.
    pub fn put_product(&mut self, product: Product) {
        self.staged.products.insert(product.product_id.clone(), product);
    }

    /// Reads an order, preferring this transaction's staged copy.
    pub fn get_order(&self, order_id: OrderId) -> Option<Order> {
        self.staged
            .orders
            .get(&order_id)
            .or_else(|| self.base.orders.get(&order_id))
            .cloned()
    }

    /// Stages an order insert or replacement.
    pub fn put_order(&mut self, order: Order) {
        self.staged.orders.insert(order.order_id(), order);
    }

    /// Compare-and-swap stock decrement.
    pub fn reserve(
        &mut self,
        product_id: &ProductId,
        quantity: Quantity,
        expected_version: Version,
    ) -> Result<Version> {
        let mut product = self.product(product_id)?;

        if product.version != expected_version {
            return Err(StoreError::ConcurrencyConflict {
                product_id: product_id.clone(),
                expected: expected_version,
                actual: product.version,
            });
        }
        if product.stock < quantity.get() {
            return Err(StoreError::OutOfStock {
                product_id: product_id.clone(),
                available: product.stock,
                requested: quantity.get(),
            });
        }

        product.stock -= quantity.get();
        product.version = product.version.next();
        let new_version = product.version;
        self.put_product(product);
        Ok(new_version)
    }

    /// Returns stock; a no-op when `release_key` was already used.
    pub fn release(
        &mut self,
        product_id: &ProductId,
        quantity: Quantity,
        release_key: &str,
    ) -> Result<()> {
        if self.base.released.contains(release_key) || self.staged.released.contains(release_key)
        {
            return Ok(());
        }

        let mut product = self.product(product_id)?;
        product.stock += quantity.get();
        product.version = product.version.next();
        self.put_product(product);
        self.staged.released.insert(release_key.to_string());
        Ok(())
    }

    /// Stages an outbox append; the sequence number is assigned at commit.
    pub fn append_event(&mut self, event: &PlacementEvent) -> Result<()> {
        self.staged.events.push(OutboxRecord::pending(event)?);
        Ok(())
    }

    /// Stages the published acknowledgement for an outbox record.
    pub fn mark_published(&mut self, event_id: EventId) -> Result<()> {
        self.staged.published.push(event_id);
        Ok(())
    }

    /// Stages a saga record insert or replacement.
    pub fn put_saga(&mut self, order_id: OrderId, saga: serde_json::Value) {
        self.staged.sagas.insert(order_id, saga);
    }
}
