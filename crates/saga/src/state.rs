//! Saga state machine.

use serde::{Deserialize, Serialize};

/// The state of a placement saga.
///
/// State transitions:
/// ```text
/// Requested ──► Reserving ──┬──► Reserved ──► PayPending ──┬──► Confirmed
///                           │                              └──► Compensating ──► Cancelled
///                           └──► Failed
/// ```
///
/// Expiry of the hold moves `Reserved` or `PayPending` straight to
/// `Cancelled` (the sweeper has already returned the stock).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    /// Order accepted; the saga has not acted yet.
    #[default]
    Requested,

    /// Waiting for the reservation service to hold stock.
    Reserving,

    /// Stock is held; the charge has not been requested yet.
    Reserved,

    /// Charge requested; waiting for the payment outcome.
    PayPending,

    /// Payment settled and the order confirmed (terminal).
    Confirmed,

    /// Undoing the hold after a payment failure.
    Compensating,

    /// The reservation step failed; nothing to undo (terminal).
    Failed,

    /// Compensation or expiry finished; the order is cancelled (terminal).
    Cancelled,
}

impl SagaState {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaState::Confirmed | SagaState::Failed | SagaState::Cancelled
        )
    }

    /// Returns true if the hold is live in this state.
    pub fn holds_stock(&self) -> bool {
        matches!(self, SagaState::Reserved | SagaState::PayPending)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Requested => "Requested",
            SagaState::Reserving => "Reserving",
            SagaState::Reserved => "Reserved",
            SagaState::PayPending => "PayPending",
            SagaState::Confirmed => "Confirmed",
            SagaState::Compensating => "Compensating",
            SagaState::Failed => "Failed",
            SagaState::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_requested() {
        assert_eq!(SagaState::default(), SagaState::Requested);
    }

    #[test]
    fn terminal_states() {
        assert!(SagaState::Confirmed.is_terminal());
        assert!(SagaState::Failed.is_terminal());
        assert!(SagaState::Cancelled.is_terminal());
        assert!(!SagaState::Requested.is_terminal());
        assert!(!SagaState::Reserving.is_terminal());
        assert!(!SagaState::Reserved.is_terminal());
        assert!(!SagaState::PayPending.is_terminal());
        assert!(!SagaState::Compensating.is_terminal());
    }

    #[test]
    fn stock_holding_states() {
        assert!(SagaState::Reserved.holds_stock());
        assert!(SagaState::PayPending.holds_stock());
        assert!(!SagaState::Reserving.holds_stock());
        assert!(!SagaState::Confirmed.holds_stock());
    }

    #[test]
    fn display_matches_name() {
        assert_eq!(SagaState::PayPending.to_string(), "PayPending");
        assert_eq!(SagaState::Compensating.to_string(), "Compensating");
    }

    #[test]
    fn serialization_roundtrip() {
        let state = SagaState::Reserving;
        let json = serde_json::to_string(&state).unwrap();
        let deserialized: SagaState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, deserialized);
    }
}
