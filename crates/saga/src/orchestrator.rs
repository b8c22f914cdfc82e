//! The saga orchestrator.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use domain::{EventKind, Order, OrderStatus, PlacementEvent};
use store::{EventHandler, HandlerError, OrderStore, StoreError};
use tokio::sync::Mutex;

use crate::error::SagaError;
use crate::instance::SagaInstance;
use crate::state::SagaState;

/// Advances placement sagas in response to placement events.
///
/// One instance per order, created on `OrderCreationRequested`. Every
/// transition is recorded through [`OrderStore::save_saga`] before the
/// in-process cache is updated, so a restarted orchestrator resumes
/// from the last durably recorded state instead of starting over.
///
/// Within each step the instance is mutated on a local copy and written
/// back only after the step's store effects succeed; a redelivered
/// event therefore re-runs a half-applied step from its starting state.
/// The cache lock is held for the whole of `handle`, so steps are
/// applied atomically with respect to other events. Duplicate or stale
/// events are skipped, never errored, so the dispatcher keeps making
/// progress under at-least-once delivery.
pub struct SagaOrchestrator<S> {
    store: S,
    sagas: Arc<Mutex<HashMap<OrderId, SagaInstance>>>,
}

impl<S: OrderStore> SagaOrchestrator<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            sagas: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Snapshot of the saga for an order, if one exists in the cache or
    /// in durable state.
    pub async fn saga(&self, order_id: OrderId) -> Option<SagaInstance> {
        let mut sagas = self.sagas.lock().await;
        self.lookup(&mut sagas, order_id).await.ok().flatten()
    }

    /// Number of cached saga instances, terminal ones included.
    pub async fn saga_count(&self) -> usize {
        self.sagas.lock().await.len()
    }

    fn fail(&self, error: impl ToString) -> HandlerError {
        HandlerError::new("saga-orchestrator", error)
    }

    /// Reads the saga for an order, falling back to durable state when
    /// it is not cached. A restart empties the cache, not the store.
    async fn lookup(
        &self,
        sagas: &mut HashMap<OrderId, SagaInstance>,
        order_id: OrderId,
    ) -> Result<Option<SagaInstance>, HandlerError> {
        if let Some(saga) = sagas.get(&order_id) {
            return Ok(Some(saga.clone()));
        }
        let Some(value) = self
            .store
            .load_saga(order_id)
            .await
            .map_err(|e| self.fail(e))?
        else {
            return Ok(None);
        };
        let saga: SagaInstance = serde_json::from_value(value).map_err(|e| self.fail(e))?;
        sagas.insert(order_id, saga.clone());
        Ok(Some(saga))
    }

    /// Durably records the saga, then writes it into the cache.
    async fn commit_saga(
        &self,
        sagas: &mut HashMap<OrderId, SagaInstance>,
        saga: SagaInstance,
    ) -> Result<(), HandlerError> {
        let value = serde_json::to_value(&saga).map_err(|e| self.fail(e))?;
        self.store
            .save_saga(saga.order_id(), value)
            .await
            .map_err(|e| self.fail(e))?;
        sagas.insert(saga.order_id(), saga);
        Ok(())
    }

    async fn load_order(&self, order_id: OrderId) -> Result<Order, SagaError> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(StoreError::OrderNotFound(order_id))?;
        Ok(order)
    }

    /// Confirms the order and records `OrderConfirmed`, atomically.
    /// An already-confirmed order is left alone.
    async fn confirm_order(&self, order_id: OrderId) -> Result<(), SagaError> {
        let mut order = self.load_order(order_id).await?;
        if order.status() == OrderStatus::Confirmed {
            return Ok(());
        }
        order.confirm()?;
        let confirmed = PlacementEvent::order_confirmed(order_id);
        self.store.commit_order_update(order, vec![confirmed]).await?;
        Ok(())
    }

    /// Cancels the order and records `OrderCancelled`, atomically.
    /// Already-terminal orders are left alone.
    async fn cancel_order(&self, order_id: OrderId) -> Result<(), SagaError> {
        let mut order = self.load_order(order_id).await?;
        if !order.status().can_cancel() {
            return Ok(());
        }
        order.cancel()?;
        let cancelled = PlacementEvent::order_cancelled(order_id);
        self.store.commit_order_update(order, vec![cancelled]).await?;
        metrics::counter!("orders_cancelled_total").increment(1);
        Ok(())
    }
}

#[async_trait]
impl<S: OrderStore> EventHandler for SagaOrchestrator<S> {
    fn name(&self) -> &'static str {
        "saga-orchestrator"
    }

    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id, event_type = event.event_type()))]
    async fn handle(&self, event: &PlacementEvent) -> Result<(), HandlerError> {
        let mut sagas = self.sagas.lock().await;

        match &event.kind {
            EventKind::OrderCreationRequested {
                product_id,
                quantity,
                ..
            } => {
                if self.lookup(&mut sagas, event.order_id).await?.is_some() {
                    return Ok(());
                }
                let mut saga = SagaInstance::new(event.order_id, product_id.clone(), *quantity);
                saga.begin_reserving().map_err(|e| self.fail(e))?;

                let request = PlacementEvent::reservation_requested(
                    event.order_id,
                    product_id.clone(),
                    *quantity,
                );
                self.store
                    .append_events(vec![request])
                    .await
                    .map_err(|e| self.fail(e))?;

                saga.record_processed(event.event_id);
                self.commit_saga(&mut sagas, saga).await?;
                metrics::counter!("sagas_started_total").increment(1);
            }

            EventKind::InventoryReserved { reservation_id, .. } => {
                let Some(mut saga) = self.lookup(&mut sagas, event.order_id).await? else {
                    tracing::warn!("reserved event for unknown saga");
                    return Ok(());
                };
                if saga.has_processed(event.event_id) || saga.state() != SagaState::Reserving {
                    return Ok(());
                }
                let order = self.load_order(event.order_id).await.map_err(|e| self.fail(e))?;
                let amount = order.total_price();
                saga.mark_reserved(*reservation_id).map_err(|e| self.fail(e))?;

                let charge = PlacementEvent::charge_requested(event.order_id, amount);
                self.store
                    .append_events(vec![charge])
                    .await
                    .map_err(|e| self.fail(e))?;

                saga.begin_payment(amount).map_err(|e| self.fail(e))?;
                saga.record_processed(event.event_id);
                self.commit_saga(&mut sagas, saga).await?;
            }

            EventKind::InventoryReservationFailed { reason, .. } => {
                let Some(mut saga) = self.lookup(&mut sagas, event.order_id).await? else {
                    return Ok(());
                };
                if saga.has_processed(event.event_id) || saga.state() != SagaState::Reserving {
                    return Ok(());
                }
                saga.fail(reason.clone()).map_err(|e| self.fail(e))?;
                self.cancel_order(event.order_id)
                    .await
                    .map_err(|e| self.fail(e))?;
                saga.record_processed(event.event_id);
                self.commit_saga(&mut sagas, saga).await?;
                metrics::counter!("sagas_failed_total").increment(1);
                tracing::info!(reason, "placement failed at reservation");
            }

            EventKind::PaymentSucceeded { .. } => {
                let Some(mut saga) = self.lookup(&mut sagas, event.order_id).await? else {
                    return Ok(());
                };
                if saga.has_processed(event.event_id) || saga.state() != SagaState::PayPending {
                    return Ok(());
                }
                self.confirm_order(event.order_id)
                    .await
                    .map_err(|e| self.fail(e))?;

                saga.confirm().map_err(|e| self.fail(e))?;
                saga.record_processed(event.event_id);
                self.commit_saga(&mut sagas, saga).await?;
                metrics::counter!("sagas_confirmed_total").increment(1);
                tracing::info!("placement confirmed");
            }

            EventKind::PaymentFailed { reason, .. } => {
                let Some(mut saga) = self.lookup(&mut sagas, event.order_id).await? else {
                    return Ok(());
                };
                if saga.has_processed(event.event_id) || saga.state() != SagaState::PayPending {
                    return Ok(());
                }
                saga.begin_compensation(reason.clone())
                    .map_err(|e| self.fail(e))?;

                // Give back the held stock, then cancel the order.
                let mut events = Vec::new();
                if let Some(reservation_id) = saga.reservation_id() {
                    events.push(PlacementEvent::reservation_release_requested(
                        event.order_id,
                        reservation_id,
                    ));
                }
                if !events.is_empty() {
                    self.store
                        .append_events(events)
                        .await
                        .map_err(|e| self.fail(e))?;
                }
                self.cancel_order(event.order_id)
                    .await
                    .map_err(|e| self.fail(e))?;

                saga.cancel().map_err(|e| self.fail(e))?;
                saga.record_processed(event.event_id);
                self.commit_saga(&mut sagas, saga).await?;
                metrics::counter!("sagas_compensated_total").increment(1);
                tracing::info!(reason, "placement compensated after payment failure");
            }

            EventKind::ReservationExpired { reservation_id, .. } => {
                let Some(mut saga) = self.lookup(&mut sagas, event.order_id).await? else {
                    return Ok(());
                };
                if saga.has_processed(event.event_id)
                    || !saga.state().holds_stock()
                    || saga.reservation_id() != Some(*reservation_id)
                {
                    return Ok(());
                }
                // The sweeper already returned the stock.
                saga.expire("reservation expired").map_err(|e| self.fail(e))?;
                self.cancel_order(event.order_id)
                    .await
                    .map_err(|e| self.fail(e))?;
                saga.record_processed(event.event_id);
                self.commit_saga(&mut sagas, saga).await?;
                metrics::counter!("sagas_expired_total").increment(1);
                tracing::info!("placement cancelled after hold expiry");
            }

            _ => {}
        }

        Ok(())
    }
}
