//! Event-driven worker bridging the saga to the reservation service.

use std::time::Duration;

use async_trait::async_trait;
use domain::{EventKind, PlacementEvent};
use store::{EventHandler, HandlerError, InventoryLedger, OrderStore, StoreError};

use crate::error::ReservationError;
use crate::service::ReservationService;

/// Consumes reservation-related events.
///
/// Holds stock on `ReservationRequested` (reporting the outcome as
/// `InventoryReserved` or `InventoryReservationFailed`), releases it on
/// `ReservationReleaseRequested`, and consumes the hold when the order
/// is confirmed.
pub struct ReservationWorker<L, S> {
    reservations: ReservationService<L>,
    store: S,
    ttl: Duration,
}

impl<L: InventoryLedger, S: OrderStore> ReservationWorker<L, S> {
    pub fn new(reservations: ReservationService<L>, store: S, ttl: Duration) -> Self {
        Self {
            reservations,
            store,
            ttl,
        }
    }

    fn fail(&self, error: impl ToString) -> HandlerError {
        HandlerError::new("reservation-worker", error)
    }
}

#[async_trait]
impl<L: InventoryLedger, S: OrderStore> EventHandler for ReservationWorker<L, S> {
    fn name(&self) -> &'static str {
        "reservation-worker"
    }

    async fn handle(&self, event: &PlacementEvent) -> Result<(), HandlerError> {
        match &event.kind {
            EventKind::ReservationRequested {
                product_id,
                quantity,
            } => {
                match self
                    .reservations
                    .hold(product_id.clone(), *quantity, event.order_id, self.ttl)
                    .await
                {
                    Ok(reservation) => {
                        let reserved = PlacementEvent::inventory_reserved(
                            event.order_id,
                            product_id.clone(),
                            *quantity,
                            reservation.reservation_id,
                        );
                        self.store
                            .append_events(vec![reserved])
                            .await
                            .map_err(|e| self.fail(e))?;
                    }
                    // Definitive rejections become a failure event; anything
                    // else is withheld so the request is redelivered.
                    Err(ReservationError::Store(error))
                        if matches!(
                            error,
                            StoreError::OutOfStock { .. }
                                | StoreError::TooManyConflicts { .. }
                                | StoreError::ProductNotFound(_)
                        ) =>
                    {
                        tracing::warn!(order_id = %event.order_id, %error, "hold rejected");
                        let failed = PlacementEvent::inventory_reservation_failed(
                            event.order_id,
                            product_id.clone(),
                            *quantity,
                            error.to_string(),
                        );
                        self.store
                            .append_events(vec![failed])
                            .await
                            .map_err(|e| self.fail(e))?;
                    }
                    Err(error) => return Err(self.fail(error)),
                }
            }
            EventKind::ReservationReleaseRequested { reservation_id } => {
                self.reservations
                    .cancel(*reservation_id)
                    .await
                    .map_err(|e| self.fail(e))?;
            }
            EventKind::OrderConfirmed { .. } => {
                if let Some(reservation) = self.reservations.find_by_holder(event.order_id).await {
                    self.reservations
                        .confirm(reservation.reservation_id)
                        .await
                        .map_err(|e| self.fail(e))?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::DEFAULT_TTL;
    use common::OrderId;
    use domain::{Currency, Money, Product, ProductId, Quantity};
    use store::InMemoryStore;

    async fn worker_with_stock(
        stock: u32,
    ) -> (
        ReservationWorker<InMemoryStore, InMemoryStore>,
        ReservationService<InMemoryStore>,
        InMemoryStore,
    ) {
        let store = InMemoryStore::new();
        store
            .upsert_product(Product::new("SKU-001", stock, Money::new(1000, Currency::Usd)))
            .await
            .unwrap();
        let reservations = ReservationService::new(store.clone());
        (
            ReservationWorker::new(reservations.clone(), store.clone(), DEFAULT_TTL),
            reservations,
            store,
        )
    }

    fn request(order_id: OrderId, quantity: u32) -> PlacementEvent {
        PlacementEvent::reservation_requested(
            order_id,
            ProductId::new("SKU-001"),
            Quantity::new(quantity).unwrap(),
        )
    }

    #[tokio::test]
    async fn request_holds_stock_and_reports_reserved() {
        let (worker, _, store) = worker_with_stock(10).await;
        let order_id = OrderId::new();

        worker.handle(&request(order_id, 4)).await.unwrap();

        assert_eq!(
            store.product(&ProductId::new("SKU-001")).await.unwrap().unwrap().stock,
            6
        );
        let pending = store.unpublished_events().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event_type, "InventoryReserved");
        assert_eq!(pending[0].event().unwrap().order_id, order_id);
    }

    #[tokio::test]
    async fn short_stock_reports_failure_instead_of_erroring() {
        let (worker, _, store) = worker_with_stock(2).await;

        worker.handle(&request(OrderId::new(), 5)).await.unwrap();

        let pending = store.unpublished_events().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event_type, "InventoryReservationFailed");
        // Stock untouched.
        assert_eq!(
            store.product(&ProductId::new("SKU-001")).await.unwrap().unwrap().stock,
            2
        );
    }

    #[tokio::test]
    async fn redelivered_request_does_not_double_hold() {
        let (worker, _, store) = worker_with_stock(10).await;
        let event = request(OrderId::new(), 4);

        worker.handle(&event).await.unwrap();
        worker.handle(&event).await.unwrap();

        assert_eq!(
            store.product(&ProductId::new("SKU-001")).await.unwrap().unwrap().stock,
            6
        );
    }

    #[tokio::test]
    async fn release_request_cancels_the_hold() {
        let (worker, reservations, store) = worker_with_stock(10).await;
        let order_id = OrderId::new();

        worker.handle(&request(order_id, 4)).await.unwrap();
        let reservation = reservations.find_by_holder(order_id).await.unwrap();

        worker
            .handle(&PlacementEvent::reservation_release_requested(
                order_id,
                reservation.reservation_id,
            ))
            .await
            .unwrap();

        assert_eq!(
            store.product(&ProductId::new("SKU-001")).await.unwrap().unwrap().stock,
            10
        );
        assert_eq!(reservations.active_count().await, 0);
    }

    #[tokio::test]
    async fn order_confirmed_consumes_the_hold() {
        let (worker, reservations, store) = worker_with_stock(10).await;
        let order_id = OrderId::new();

        worker.handle(&request(order_id, 4)).await.unwrap();
        let reservation = reservations.find_by_holder(order_id).await.unwrap();

        worker
            .handle(&PlacementEvent::order_confirmed(order_id))
            .await
            .unwrap();

        assert!(reservations.is_confirmed(reservation.reservation_id).await);
        // Confirmed stock stays decremented.
        assert_eq!(
            store.product(&ProductId::new("SKU-001")).await.unwrap().unwrap().stock,
            6
        );
    }
}
