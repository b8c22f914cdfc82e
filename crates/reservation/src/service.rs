//! The reservation service.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{OrderId, ReservationId};
use domain::{ProductId, Quantity};
use store::{InventoryLedger, InventoryLedgerExt};
use tokio::sync::Mutex;

use crate::error::ReservationError;

/// Default lifetime of a hold before the sweeper reclaims it.
pub const DEFAULT_TTL: Duration = Duration::from_secs(120);

/// A TTL-bounded hold on stock, keyed to the order that wants it.
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub reservation_id: ReservationId,
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub holder_id: OrderId,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct ServiceState {
    active: HashMap<ReservationId, Reservation>,
    by_holder: HashMap<OrderId, ReservationId>,
    confirmed: HashSet<ReservationId>,
}

/// Manages holds on top of an [`InventoryLedger`].
///
/// The ledger decrement happens at hold time, so held stock is already
/// out of the sellable pool; confirm merely forgets the hold while
/// cancel and expiry return the stock. All three are idempotent, which
/// keeps at-least-once event delivery safe.
#[derive(Debug, Clone)]
pub struct ReservationService<L> {
    ledger: L,
    state: Arc<Mutex<ServiceState>>,
}

impl<L: InventoryLedger> ReservationService<L> {
    pub fn new(ledger: L) -> Self {
        Self {
            ledger,
            state: Arc::new(Mutex::new(ServiceState::default())),
        }
    }

    /// Places a hold for `holder_id`, decrementing ledger stock.
    ///
    /// A holder gets at most one active hold: a repeated call returns
    /// the existing reservation instead of decrementing again.
    #[tracing::instrument(skip(self), fields(%product_id, %holder_id))]
    pub async fn hold(
        &self,
        product_id: ProductId,
        quantity: Quantity,
        holder_id: OrderId,
        ttl: Duration,
    ) -> Result<Reservation, ReservationError> {
        {
            let state = self.state.lock().await;
            if let Some(reservation_id) = state.by_holder.get(&holder_id)
                && let Some(existing) = state.active.get(reservation_id)
            {
                return Ok(existing.clone());
            }
        }

        self.ledger.reserve_with_retry(&product_id, quantity).await?;

        let reservation = Reservation {
            reservation_id: ReservationId::new(),
            product_id,
            quantity,
            holder_id,
            expires_at: Utc::now() + chrono::Duration::milliseconds(ttl.as_millis() as i64),
        };

        let mut state = self.state.lock().await;
        state
            .by_holder
            .insert(holder_id, reservation.reservation_id);
        state
            .active
            .insert(reservation.reservation_id, reservation.clone());
        metrics::counter!("reservations_held_total").increment(1);
        tracing::info!(reservation_id = %reservation.reservation_id, "stock held");
        Ok(reservation)
    }

    /// Consumes the hold permanently; the stock stays decremented.
    pub async fn confirm(&self, reservation_id: ReservationId) -> Result<(), ReservationError> {
        let mut state = self.state.lock().await;
        if state.confirmed.contains(&reservation_id) {
            return Ok(());
        }
        let reservation = state
            .active
            .remove(&reservation_id)
            .ok_or(ReservationError::NotFound(reservation_id))?;
        state.by_holder.remove(&reservation.holder_id);
        state.confirmed.insert(reservation_id);
        metrics::counter!("reservations_confirmed_total").increment(1);
        Ok(())
    }

    /// Releases the hold and returns its stock. A no-op for holds that
    /// are already gone.
    pub async fn cancel(&self, reservation_id: ReservationId) -> Result<(), ReservationError> {
        let removed = {
            let mut state = self.state.lock().await;
            match state.active.remove(&reservation_id) {
                Some(reservation) => {
                    state.by_holder.remove(&reservation.holder_id);
                    Some(reservation)
                }
                None => None,
            }
        };

        if let Some(reservation) = removed {
            self.ledger
                .release(
                    &reservation.product_id,
                    reservation.quantity,
                    &reservation.reservation_id.to_string(),
                )
                .await?;
            metrics::counter!("reservations_cancelled_total").increment(1);
            tracing::info!(%reservation_id, "hold cancelled, stock returned");
        }
        Ok(())
    }

    /// Removes every hold whose deadline is before `now`, returning the
    /// expired reservations after their stock has been released.
    pub async fn sweep_once(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, ReservationError> {
        let mut expired = Vec::new();
        {
            let mut state = self.state.lock().await;
            let ids: Vec<ReservationId> = state
                .active
                .values()
                .filter(|r| r.expires_at < now)
                .map(|r| r.reservation_id)
                .collect();
            for id in ids {
                if let Some(reservation) = state.active.remove(&id) {
                    state.by_holder.remove(&reservation.holder_id);
                    expired.push(reservation);
                }
            }
        }

        for reservation in &expired {
            self.ledger
                .release(
                    &reservation.product_id,
                    reservation.quantity,
                    &reservation.reservation_id.to_string(),
                )
                .await?;
            metrics::counter!("reservations_expired_total").increment(1);
        }
        Ok(expired)
    }

    /// The active hold owned by `holder_id`, if any.
    pub async fn find_by_holder(&self, holder_id: OrderId) -> Option<Reservation> {
        let state = self.state.lock().await;
        state
            .by_holder
            .get(&holder_id)
            .and_then(|id| state.active.get(id))
            .cloned()
    }

    /// Number of currently active holds.
    pub async fn active_count(&self) -> usize {
        self.state.lock().await.active.len()
    }

    /// Returns true if the reservation was confirmed.
    pub async fn is_confirmed(&self, reservation_id: ReservationId) -> bool {
        self.state.lock().await.confirmed.contains(&reservation_id)
    }
}
