//! Per-order saga instance.

use std::collections::HashSet;

use common::{EventId, OrderId, ReservationId};
use domain::{Money, ProductId, Quantity};
use serde::{Deserialize, Serialize};

use crate::error::SagaError;
use crate::state::SagaState;

/// The saga tracking one order's placement.
///
/// Records every event ID it has acted on, so a redelivered event can
/// be recognized and skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaInstance {
    order_id: OrderId,
    product_id: ProductId,
    quantity: Quantity,
    state: SagaState,
    reservation_id: Option<ReservationId>,
    amount: Option<Money>,
    failure_reason: Option<String>,
    processed: HashSet<EventId>,
}

impl SagaInstance {
    /// Creates a saga in the `Requested` state.
    pub fn new(order_id: OrderId, product_id: ProductId, quantity: Quantity) -> Self {
        Self {
            order_id,
            product_id,
            quantity,
            state: SagaState::Requested,
            reservation_id: None,
            amount: None,
            failure_reason: None,
            processed: HashSet::new(),
        }
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    pub fn reservation_id(&self) -> Option<ReservationId> {
        self.reservation_id
    }

    pub fn amount(&self) -> Option<Money> {
        self.amount
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Returns true if this event was already applied.
    pub fn has_processed(&self, event_id: EventId) -> bool {
        self.processed.contains(&event_id)
    }

    /// Records an applied event for replay detection.
    pub fn record_processed(&mut self, event_id: EventId) {
        self.processed.insert(event_id);
    }

    fn transition(
        &mut self,
        from: SagaState,
        to: SagaState,
        action: &'static str,
    ) -> Result<(), SagaError> {
        if self.state != from {
            return Err(SagaError::InvalidTransition {
                order_id: self.order_id,
                state: self.state,
                action,
            });
        }
        self.state = to;
        Ok(())
    }

    /// `Requested` to `Reserving`: the hold request is out.
    pub fn begin_reserving(&mut self) -> Result<(), SagaError> {
        self.transition(SagaState::Requested, SagaState::Reserving, "begin reserving")
    }

    /// `Reserving` to `Reserved`: stock is held.
    pub fn mark_reserved(&mut self, reservation_id: ReservationId) -> Result<(), SagaError> {
        self.transition(SagaState::Reserving, SagaState::Reserved, "mark reserved")?;
        self.reservation_id = Some(reservation_id);
        Ok(())
    }

    /// `Reserved` to `PayPending`: the charge request is out.
    pub fn begin_payment(&mut self, amount: Money) -> Result<(), SagaError> {
        self.transition(SagaState::Reserved, SagaState::PayPending, "begin payment")?;
        self.amount = Some(amount);
        Ok(())
    }

    /// `PayPending` to `Confirmed`.
    pub fn confirm(&mut self) -> Result<(), SagaError> {
        self.transition(SagaState::PayPending, SagaState::Confirmed, "confirm")
    }

    /// `Reserving` to `Failed`: the hold was rejected, nothing to undo.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), SagaError> {
        self.transition(SagaState::Reserving, SagaState::Failed, "fail")?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    /// `PayPending` to `Compensating`: undoing the hold.
    pub fn begin_compensation(&mut self, reason: impl Into<String>) -> Result<(), SagaError> {
        self.transition(
            SagaState::PayPending,
            SagaState::Compensating,
            "begin compensation",
        )?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    /// `Compensating` to `Cancelled`.
    pub fn cancel(&mut self) -> Result<(), SagaError> {
        self.transition(SagaState::Compensating, SagaState::Cancelled, "cancel")
    }

    /// Expiry shortcut: a stock-holding state straight to `Cancelled`.
    ///
    /// The sweeper has already returned the stock, so there is no
    /// compensation step to run.
    pub fn expire(&mut self, reason: impl Into<String>) -> Result<(), SagaError> {
        if !self.state.holds_stock() {
            return Err(SagaError::InvalidTransition {
                order_id: self.order_id,
                state: self.state,
                action: "expire",
            });
        }
        self.state = SagaState::Cancelled;
        self.failure_reason = Some(reason.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::Currency;

    fn saga() -> SagaInstance {
        SagaInstance::new(
            OrderId::new(),
            ProductId::new("SKU-001"),
            Quantity::new(2).unwrap(),
        )
    }

    #[test]
    fn happy_path_transitions() {
        let mut saga = saga();
        assert_eq!(saga.state(), SagaState::Requested);

        saga.begin_reserving().unwrap();
        assert_eq!(saga.state(), SagaState::Reserving);

        let reservation_id = ReservationId::new();
        saga.mark_reserved(reservation_id).unwrap();
        assert_eq!(saga.reservation_id(), Some(reservation_id));

        let amount = Money::new(5998, Currency::Usd);
        saga.begin_payment(amount).unwrap();
        assert_eq!(saga.state(), SagaState::PayPending);
        assert_eq!(saga.amount(), Some(amount));

        saga.confirm().unwrap();
        assert!(saga.state().is_terminal());
    }

    #[test]
    fn reservation_failure_ends_in_failed() {
        let mut saga = saga();
        saga.begin_reserving().unwrap();
        saga.fail("insufficient stock").unwrap();
        assert_eq!(saga.state(), SagaState::Failed);
        assert_eq!(saga.failure_reason(), Some("insufficient stock"));
    }

    #[test]
    fn payment_failure_compensates_then_cancels() {
        let mut saga = saga();
        saga.begin_reserving().unwrap();
        saga.mark_reserved(ReservationId::new()).unwrap();
        saga.begin_payment(Money::new(100, Currency::Usd)).unwrap();

        saga.begin_compensation("payment declined").unwrap();
        assert_eq!(saga.state(), SagaState::Compensating);
        saga.cancel().unwrap();
        assert_eq!(saga.state(), SagaState::Cancelled);
    }

    #[test]
    fn expire_only_from_stock_holding_states() {
        let mut saga = saga();
        assert!(saga.expire("hold expired").is_err());

        saga.begin_reserving().unwrap();
        saga.mark_reserved(ReservationId::new()).unwrap();
        saga.expire("hold expired").unwrap();
        assert_eq!(saga.state(), SagaState::Cancelled);
    }

    #[test]
    fn out_of_order_transition_is_rejected() {
        let mut saga = saga();
        let result = saga.confirm();
        assert!(matches!(
            result,
            Err(SagaError::InvalidTransition {
                state: SagaState::Requested,
                action: "confirm",
                ..
            })
        ));
    }

    #[test]
    fn processed_events_are_remembered() {
        let mut saga = saga();
        let event_id = EventId::new();
        assert!(!saga.has_processed(event_id));
        saga.record_processed(event_id);
        assert!(saga.has_processed(event_id));
    }
}
