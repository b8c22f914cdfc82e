//! Background sweeper reclaiming expired holds.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use domain::PlacementEvent;
use store::{InventoryLedger, OrderStore};
use tokio::task::JoinHandle;

use crate::error::ReservationError;
use crate::service::ReservationService;

/// How often the sweeper looks for expired holds.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Periodically expires stale holds and records the expiry as an event
/// so the saga can cancel the waiting order.
pub struct Sweeper<L, S> {
    reservations: ReservationService<L>,
    store: S,
}

impl<L: InventoryLedger, S: OrderStore> Sweeper<L, S> {
    pub fn new(reservations: ReservationService<L>, store: S) -> Self {
        Self {
            reservations,
            store,
        }
    }

    /// One sweep pass: release expired holds, emit one
    /// `ReservationExpired` per hold. Returns how many expired.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Result<usize, ReservationError> {
        let expired = self.reservations.sweep_once(Utc::now()).await?;

        for reservation in &expired {
            let event = PlacementEvent::reservation_expired(
                reservation.holder_id,
                reservation.reservation_id,
                reservation.product_id.clone(),
                reservation.quantity,
            );
            self.store.append_events(vec![event]).await?;
            tracing::info!(
                reservation_id = %reservation.reservation_id,
                order_id = %reservation.holder_id,
                "hold expired, stock returned"
            );
        }
        Ok(expired.len())
    }
}

impl<L, S> Sweeper<L, S>
where
    L: InventoryLedger + Send + Sync + 'static,
    S: OrderStore + 'static,
{
    /// Spawns the sweep loop on the given interval.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(error) = self.run_once().await {
                    tracing::error!(%error, "sweep pass failed");
                }
            }
        })
    }
}
