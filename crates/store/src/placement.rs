//! Order placement entry point.
//!
//! Regular products are placed in one atomic commit: compare-and-swap
//! stock decrement, order insert and outbox append together, retried a
//! bounded number of times on version conflicts. Flash-sale products
//! are accepted as `Pending` and handed to the saga via an
//! `OrderCreationRequested` event; the caller polls the order for its
//! terminal status.

use std::time::Instant;

use common::UserId;
use domain::{Order, OrderError, PlacementEvent, Product, ProductId};
use thiserror::Error;

use crate::error::StoreError;
use crate::ledger::{InventoryLedger, MAX_RESERVE_ATTEMPTS};
use crate::order_store::OrderStore;

/// Request to place an order.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Errors surfaced by order placement.
#[derive(Debug, Error)]
pub enum PlacementError {
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Places orders against a store that is both order store and ledger.
pub struct PlacementService<S> {
    store: S,
}

impl<S: OrderStore + InventoryLedger> PlacementService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Places an order for the given product.
    #[tracing::instrument(skip(self, cmd), fields(product_id = %cmd.product_id, quantity = cmd.quantity))]
    pub async fn place_order(&self, cmd: CreateOrder) -> Result<Order, PlacementError> {
        metrics::counter!("orders_requested_total").increment(1);
        let started = Instant::now();

        let product = self
            .store
            .product(&cmd.product_id)
            .await?
            .ok_or_else(|| StoreError::ProductNotFound(cmd.product_id.clone()))?;

        let order = if product.flash_sale {
            self.place_via_saga(&cmd, &product).await?
        } else {
            self.place_local(&cmd).await?
        };

        metrics::histogram!("order_placement_seconds").record(started.elapsed().as_secs_f64());
        Ok(order)
    }

    /// Single-transaction path: confirm immediately or fail.
    async fn place_local(&self, cmd: &CreateOrder) -> Result<Order, PlacementError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let product = self
                .store
                .product(&cmd.product_id)
                .await?
                .ok_or_else(|| StoreError::ProductNotFound(cmd.product_id.clone()))?;

            let mut order = Order::create(cmd.user_id, cmd.quantity, &product)?;
            order.confirm()?;
            let events = vec![PlacementEvent::order_confirmed(order.order_id())];

            match self
                .store
                .commit_placement(order.clone(), product.version, events)
                .await
            {
                Ok(_) => {
                    metrics::counter!("orders_confirmed_total").increment(1);
                    tracing::info!(order_id = %order.order_id(), "order confirmed");
                    return Ok(order);
                }
                Err(StoreError::ConcurrencyConflict { .. }) if attempt < MAX_RESERVE_ATTEMPTS => {
                    metrics::counter!("ledger_reserve_conflicts_total").increment(1);
                    tracing::debug!(attempt, "placement lost the version race, retrying");
                }
                Err(StoreError::ConcurrencyConflict { .. }) => {
                    metrics::counter!("ledger_reserve_conflicts_total").increment(1);
                    return Err(StoreError::TooManyConflicts {
                        product_id: cmd.product_id.clone(),
                        attempts: attempt,
                    }
                    .into());
                }
                Err(other) => return Err(other.into()),
            }
        }
    }

    /// Saga path: record the pending order and emit the kickoff event.
    async fn place_via_saga(
        &self,
        cmd: &CreateOrder,
        product: &Product,
    ) -> Result<Order, PlacementError> {
        let order = Order::create(cmd.user_id, cmd.quantity, product)?;
        let kickoff = PlacementEvent::order_creation_requested(
            order.order_id(),
            cmd.user_id,
            cmd.product_id.clone(),
            order.quantity(),
        );
        self.store
            .commit_order_update(order.clone(), vec![kickoff])
            .await?;

        metrics::counter!("orders_accepted_total").increment(1);
        tracing::info!(order_id = %order.order_id(), "order accepted, placement continues asynchronously");
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use common::Version;
    use domain::{Currency, EventKind, Money, OrderStatus};

    fn widget(stock: u32) -> Product {
        Product::new("SKU-001", stock, Money::new(2999, Currency::Usd))
    }

    async fn service_with(product: Product) -> (PlacementService<InMemoryStore>, InMemoryStore) {
        let store = InMemoryStore::new();
        store.upsert_product(product).await.unwrap();
        (PlacementService::new(store.clone()), store)
    }

    fn cmd(quantity: u32) -> CreateOrder {
        CreateOrder {
            user_id: UserId::new(),
            product_id: ProductId::new("SKU-001"),
            quantity,
        }
    }

    #[tokio::test]
    async fn local_placement_confirms_and_decrements() {
        let (service, store) = service_with(widget(10)).await;

        let order = service.place_order(cmd(3)).await.unwrap();
        assert_eq!(order.status(), OrderStatus::Confirmed);
        assert_eq!(order.total_price(), Money::new(8997, Currency::Usd));

        let product = store.product(&ProductId::new("SKU-001")).await.unwrap().unwrap();
        assert_eq!(product.stock, 7);
        assert_eq!(product.version, Version::first());

        let stored = store.get_order(order.order_id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Confirmed);

        let pending = store.unpublished_events().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event_type, "OrderConfirmed");
    }

    #[tokio::test]
    async fn zero_quantity_is_rejected_without_writes() {
        let (service, store) = service_with(widget(10)).await;

        let result = service.place_order(cmd(0)).await;
        assert!(matches!(
            result,
            Err(PlacementError::Order(OrderError::InvalidQuantity(_)))
        ));
        assert!(store.unpublished_events().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn out_of_stock_is_rejected_without_writes() {
        let (service, store) = service_with(widget(2)).await;

        let result = service.place_order(cmd(3)).await;
        assert!(matches!(
            result,
            Err(PlacementError::Order(OrderError::OutOfStock { .. }))
        ));
        assert_eq!(
            store.product(&ProductId::new("SKU-001")).await.unwrap().unwrap().stock,
            2
        );
    }

    #[tokio::test]
    async fn unknown_product_is_rejected() {
        let (service, _) = service_with(widget(10)).await;
        let result = service
            .place_order(CreateOrder {
                user_id: UserId::new(),
                product_id: ProductId::new("SKU-MISSING"),
                quantity: 1,
            })
            .await;
        assert!(matches!(
            result,
            Err(PlacementError::Store(StoreError::ProductNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn flash_sale_placement_stays_pending_and_emits_kickoff() {
        let (service, store) = service_with(widget(10).flash_sale(true)).await;

        let order = service.place_order(cmd(2)).await.unwrap();
        assert_eq!(order.status(), OrderStatus::Pending);

        // Stock is untouched until the reservation worker holds it.
        let product = store.product(&ProductId::new("SKU-001")).await.unwrap().unwrap();
        assert_eq!(product.stock, 10);

        let pending = store.unpublished_events().await.unwrap();
        assert_eq!(pending.len(), 1);
        let event = pending[0].event().unwrap();
        assert!(matches!(event.kind, EventKind::OrderCreationRequested { .. }));
        assert_eq!(event.order_id, order.order_id());
    }
}
