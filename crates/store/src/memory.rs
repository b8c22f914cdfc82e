//! In-memory store backend.

use async_trait::async_trait;
use common::{EventId, OrderId, Version};
use domain::{Order, PlacementEvent, Product, ProductId, Quantity};

use crate::error::Result;
use crate::ledger::InventoryLedger;
use crate::order_store::OrderStore;
use crate::outbox::OutboxRecord;
use crate::txn::TransactionManager;

/// Store backend keeping everything in process memory.
///
/// Orders, products and the outbox live under one [`TransactionManager`],
/// so placement commits are atomic across all three. Cloning is cheap
/// and clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    txn: TransactionManager,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The underlying transaction manager, for composing custom units
    /// of work in tests.
    pub fn transaction_manager(&self) -> &TransactionManager {
        &self.txn
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn upsert_product(&self, product: Product) -> Result<()> {
        self.txn
            .run(|txn| {
                txn.put_product(product);
                Ok(())
            })
            .await
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        self.txn.read(|state| state.orders.get(&order_id).cloned()).await
    }

    async fn commit_placement(
        &self,
        order: Order,
        expected_version: Version,
        events: Vec<PlacementEvent>,
    ) -> Result<Version> {
        self.txn
            .run(|txn| {
                let new_version =
                    txn.reserve(order.product_id(), order.quantity(), expected_version)?;
                txn.put_order(order);
                for event in &events {
                    txn.append_event(event)?;
                }
                Ok(new_version)
            })
            .await
    }

    async fn commit_order_update(&self, order: Order, events: Vec<PlacementEvent>) -> Result<()> {
        self.txn
            .run(|txn| {
                txn.put_order(order);
                for event in &events {
                    txn.append_event(event)?;
                }
                Ok(())
            })
            .await
    }

    async fn append_events(&self, events: Vec<PlacementEvent>) -> Result<()> {
        self.txn
            .run(|txn| {
                for event in &events {
                    txn.append_event(event)?;
                }
                Ok(())
            })
            .await
    }

    async fn unpublished_events(&self) -> Result<Vec<OutboxRecord>> {
        self.txn
            .read(|state| {
                state
                    .outbox
                    .iter()
                    .filter(|r| r.published_at.is_none())
                    .cloned()
                    .collect()
            })
            .await
    }

    async fn mark_published(&self, event_id: EventId) -> Result<()> {
        self.txn
            .run(|txn| txn.mark_published(event_id))
            .await
    }

    async fn save_saga(&self, order_id: OrderId, saga: serde_json::Value) -> Result<()> {
        self.txn
            .run(|txn| {
                txn.put_saga(order_id, saga);
                Ok(())
            })
            .await
    }

    async fn load_saga(&self, order_id: OrderId) -> Result<Option<serde_json::Value>> {
        self.txn
            .read(|state| state.sagas.get(&order_id).cloned())
            .await
    }
}

#[async_trait]
impl InventoryLedger for InMemoryStore {
    async fn product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        self.txn
            .read(|state| state.products.get(product_id).cloned())
            .await
    }

    async fn reserve(
        &self,
        product_id: &ProductId,
        quantity: Quantity,
        expected_version: Version,
    ) -> Result<Version> {
        self.txn
            .run(|txn| txn.reserve(product_id, quantity, expected_version))
            .await
    }

    async fn release(
        &self,
        product_id: &ProductId,
        quantity: Quantity,
        release_key: &str,
    ) -> Result<()> {
        self.txn
            .run(|txn| txn.release(product_id, quantity, release_key))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use common::UserId;
    use domain::{Currency, Money};

    fn widget(stock: u32) -> Product {
        Product::new("SKU-001", stock, Money::new(2999, Currency::Usd))
    }

    fn sku() -> ProductId {
        ProductId::new("SKU-001")
    }

    #[tokio::test]
    async fn reserve_decrements_and_bumps_version() {
        let store = InMemoryStore::new();
        store.upsert_product(widget(10)).await.unwrap();

        let version = store
            .reserve(&sku(), Quantity::new(3).unwrap(), Version::initial())
            .await
            .unwrap();
        assert_eq!(version, Version::first());

        let product = store.product(&sku()).await.unwrap().unwrap();
        assert_eq!(product.stock, 7);
        assert_eq!(product.version, Version::first());
    }

    #[tokio::test]
    async fn reserve_with_stale_version_conflicts() {
        let store = InMemoryStore::new();
        store.upsert_product(widget(10)).await.unwrap();
        store
            .reserve(&sku(), Quantity::new(1).unwrap(), Version::initial())
            .await
            .unwrap();

        let result = store
            .reserve(&sku(), Quantity::new(1).unwrap(), Version::initial())
            .await;
        assert!(matches!(
            result,
            Err(StoreError::ConcurrencyConflict {
                expected,
                actual,
                ..
            }) if expected == Version::initial() && actual == Version::first()
        ));

        // Stock untouched by the failed attempt.
        assert_eq!(store.product(&sku()).await.unwrap().unwrap().stock, 9);
    }

    #[tokio::test]
    async fn reserve_beyond_stock_is_rejected() {
        let store = InMemoryStore::new();
        store.upsert_product(widget(2)).await.unwrap();

        let result = store
            .reserve(&sku(), Quantity::new(3).unwrap(), Version::initial())
            .await;
        assert!(matches!(
            result,
            Err(StoreError::OutOfStock {
                available: 2,
                requested: 3,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn commit_placement_is_atomic_on_conflict() {
        let store = InMemoryStore::new();
        store.upsert_product(widget(10)).await.unwrap();

        let order = Order::create(UserId::new(), 2, &widget(10)).unwrap();
        let order_id = order.order_id();
        let events = vec![PlacementEvent::order_confirmed(order_id)];

        // Stale version: nothing must land.
        let result = store
            .commit_placement(order, Version::first(), events)
            .await;
        assert!(result.is_err());
        assert!(store.get_order(order_id).await.unwrap().is_none());
        assert!(store.unpublished_events().await.unwrap().is_empty());
        assert_eq!(store.product(&sku()).await.unwrap().unwrap().stock, 10);
    }

    #[tokio::test]
    async fn commit_placement_lands_order_stock_and_outbox_together() {
        let store = InMemoryStore::new();
        store.upsert_product(widget(10)).await.unwrap();

        let mut order = Order::create(UserId::new(), 2, &widget(10)).unwrap();
        order.confirm().unwrap();
        let order_id = order.order_id();

        let version = store
            .commit_placement(
                order,
                Version::initial(),
                vec![PlacementEvent::order_confirmed(order_id)],
            )
            .await
            .unwrap();

        assert_eq!(version, Version::first());
        assert!(store.get_order(order_id).await.unwrap().is_some());
        let pending = store.unpublished_events().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event_type, "OrderConfirmed");
        assert_eq!(store.product(&sku()).await.unwrap().unwrap().stock, 8);
    }

    #[tokio::test]
    async fn mark_published_removes_from_pending() {
        let store = InMemoryStore::new();
        let event = PlacementEvent::order_confirmed(OrderId::new());
        let event_id = event.event_id;
        store.append_events(vec![event]).await.unwrap();

        store.mark_published(event_id).await.unwrap();
        assert!(store.unpublished_events().await.unwrap().is_empty());

        // Marking again is harmless.
        store.mark_published(event_id).await.unwrap();
    }

    #[tokio::test]
    async fn saga_record_roundtrips_and_overwrites() {
        let store = InMemoryStore::new();
        let order_id = OrderId::new();
        assert!(store.load_saga(order_id).await.unwrap().is_none());

        let first = serde_json::json!({ "state": "Reserving" });
        store.save_saga(order_id, first.clone()).await.unwrap();
        assert_eq!(store.load_saga(order_id).await.unwrap(), Some(first));

        let second = serde_json::json!({ "state": "PayPending" });
        store.save_saga(order_id, second.clone()).await.unwrap();
        assert_eq!(store.load_saga(order_id).await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn release_returns_stock_once_per_key() {
        let store = InMemoryStore::new();
        store.upsert_product(widget(0)).await.unwrap();

        store
            .release(&sku(), Quantity::new(4).unwrap(), "res-1")
            .await
            .unwrap();
        store
            .release(&sku(), Quantity::new(4).unwrap(), "res-1")
            .await
            .unwrap();

        assert_eq!(store.product(&sku()).await.unwrap().unwrap().stock, 4);
    }
}
