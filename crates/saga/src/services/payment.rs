//! Payment gateway trait, in-memory gateway and the charging adapter.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use common::OrderId;
use domain::{EventKind, Money, PlacementEvent};
use store::{EventHandler, HandlerError, OrderStore};
use thiserror::Error;

/// Errors from charging a payment.
#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    /// The gateway refused the charge; retrying will not help.
    #[error("payment declined: {0}")]
    Declined(String),

    /// The gateway could not be reached or timed out.
    #[error("payment service unavailable: {0}")]
    Unavailable(String),
}

/// External payment processor.
///
/// `charge` must be idempotent per order: the adapter retries on
/// unavailability and events are delivered at least once.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, order_id: OrderId, amount: Money) -> Result<(), PaymentError>;
}

#[derive(Debug, Default)]
struct GatewayState {
    charges: HashMap<OrderId, Money>,
    decline_all: bool,
    unavailable_budget: u32,
}

/// In-memory payment gateway for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to decline every charge.
    pub fn set_decline(&self, decline: bool) {
        self.state.lock().unwrap().decline_all = decline;
    }

    /// Makes the next `calls` charges fail as unavailable.
    pub fn set_unavailable_for(&self, calls: u32) {
        self.state.lock().unwrap().unavailable_budget = calls;
    }

    /// Number of settled charges.
    pub fn charge_count(&self) -> usize {
        self.state.lock().unwrap().charges.len()
    }

    /// The settled amount for an order, if charged.
    pub fn charged_amount(&self, order_id: OrderId) -> Option<Money> {
        self.state.lock().unwrap().charges.get(&order_id).copied()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn charge(&self, order_id: OrderId, amount: Money) -> Result<(), PaymentError> {
        let mut state = self.state.lock().unwrap();

        if state.charges.contains_key(&order_id) {
            return Ok(());
        }
        if state.unavailable_budget > 0 {
            state.unavailable_budget -= 1;
            return Err(PaymentError::Unavailable("connection refused".to_string()));
        }
        if state.decline_all {
            return Err(PaymentError::Declined("card declined".to_string()));
        }

        state.charges.insert(order_id, amount);
        Ok(())
    }
}

/// Retry policy for unavailable gateways: exponential backoff starting
/// at `base_delay` and doubling per attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetrySchedule {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Circuit breaker guarding the payment gateway.
///
/// Opens after `threshold` consecutive unavailability failures; while
/// open, charges fail fast. Closes again once `reset_after` has passed.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    threshold: u32,
    reset_after: Duration,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(30))
    }
}

impl CircuitBreaker {
    pub fn new(threshold: u32, reset_after: Duration) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            threshold,
            reset_after,
        }
    }

    /// Returns true while the breaker rejects calls.
    pub fn is_open(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.opened_at {
            Some(opened_at) if opened_at.elapsed() >= self.reset_after => {
                state.opened_at = None;
                state.consecutive_failures = 0;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap();
        state.consecutive_failures = 0;
        state.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock().unwrap();
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.threshold && state.opened_at.is_none() {
            state.opened_at = Some(Instant::now());
            tracing::warn!(
                failures = state.consecutive_failures,
                "payment circuit opened"
            );
        }
    }
}

/// Consumes `ChargeRequested`, calls the gateway and reports the
/// outcome as `PaymentSucceeded` or `PaymentFailed`.
///
/// Unavailability is retried with backoff inside one delivery; a
/// decline is final immediately. Either way the adapter acknowledges
/// the event and reports the outcome, so the saga always hears back.
pub struct PaymentAdapter<S> {
    gateway: Arc<dyn PaymentGateway>,
    store: S,
    schedule: RetrySchedule,
    breaker: CircuitBreaker,
}

impl<S: OrderStore> PaymentAdapter<S> {
    pub fn new(gateway: Arc<dyn PaymentGateway>, store: S) -> Self {
        Self::with_schedule(gateway, store, RetrySchedule::default())
    }

    pub fn with_schedule(
        gateway: Arc<dyn PaymentGateway>,
        store: S,
        schedule: RetrySchedule,
    ) -> Self {
        Self {
            gateway,
            store,
            schedule,
            breaker: CircuitBreaker::default(),
        }
    }

    fn fail(&self, error: impl ToString) -> HandlerError {
        HandlerError::new("payment-adapter", error)
    }

    async fn report(&self, event: PlacementEvent) -> Result<(), HandlerError> {
        self.store
            .append_events(vec![event])
            .await
            .map_err(|e| self.fail(e))
    }

    async fn charge_with_retry(&self, order_id: OrderId, amount: Money) -> Result<(), PaymentError> {
        let mut delay = self.schedule.base_delay;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.gateway.charge(order_id, amount).await {
                Ok(()) => {
                    self.breaker.record_success();
                    return Ok(());
                }
                Err(declined @ PaymentError::Declined(_)) => return Err(declined),
                Err(unavailable @ PaymentError::Unavailable(_)) => {
                    self.breaker.record_failure();
                    metrics::counter!("payment_gateway_unavailable_total").increment(1);
                    if attempt >= self.schedule.max_attempts {
                        return Err(unavailable);
                    }
                    tracing::debug!(attempt, ?delay, "gateway unavailable, backing off");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
}

#[async_trait]
impl<S: OrderStore> EventHandler for PaymentAdapter<S> {
    fn name(&self) -> &'static str {
        "payment-adapter"
    }

    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id))]
    async fn handle(&self, event: &PlacementEvent) -> Result<(), HandlerError> {
        let EventKind::ChargeRequested { amount } = &event.kind else {
            return Ok(());
        };
        let amount = *amount;

        if self.breaker.is_open() {
            tracing::warn!("circuit open, failing charge fast");
            return self
                .report(PlacementEvent::payment_failed(
                    event.order_id,
                    amount,
                    "payment circuit open",
                ))
                .await;
        }

        match self.charge_with_retry(event.order_id, amount).await {
            Ok(()) => {
                metrics::counter!("payments_succeeded_total").increment(1);
                self.report(PlacementEvent::payment_succeeded(event.order_id, amount))
                    .await
            }
            Err(error) => {
                metrics::counter!("payments_failed_total").increment(1);
                tracing::warn!(%error, "charge failed");
                self.report(PlacementEvent::payment_failed(
                    event.order_id,
                    amount,
                    error.to_string(),
                ))
                .await
            }
        }
    }
}
