//! HTTP API server for the order placement engine.
//!
//! Provides REST endpoints for products and order placement, with
//! structured logging (tracing) and Prometheus metrics. Background
//! loops (outbox dispatcher, reservation sweeper) are wired here and
//! spawned by the binary.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use reservation::{ReservationService, ReservationWorker, Sweeper};
use saga::{InMemoryPaymentGateway, PaymentAdapter, SagaOrchestrator};
use store::{InMemoryEventChannel, InventoryLedger, OrderStore, OutboxDispatcher};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: OrderStore + InventoryLedger + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/products", post(routes::products::upsert::<S>))
        .route("/products/{id}", get(routes::products::get::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the full placement pipeline over the given store.
///
/// Registers the saga orchestrator, reservation worker and payment
/// adapter on one in-process channel fed by the outbox dispatcher.
/// The dispatcher and sweeper loops are returned inside the state for
/// the caller to spawn.
pub fn create_default_state<S: OrderStore + InventoryLedger + Clone + 'static>(
    store: S,
    config: &Config,
) -> Arc<AppState<S>> {
    let channel = Arc::new(InMemoryEventChannel::new());
    let orchestrator = Arc::new(SagaOrchestrator::new(store.clone()));
    let reservations = ReservationService::new(store.clone());
    let worker = Arc::new(ReservationWorker::new(
        reservations.clone(),
        store.clone(),
        config.reservation_ttl(),
    ));
    let payment_gateway = Arc::new(InMemoryPaymentGateway::new());
    let payment_adapter = Arc::new(PaymentAdapter::new(payment_gateway.clone(), store.clone()));

    channel.register(orchestrator.clone());
    channel.register(worker);
    channel.register(payment_adapter);

    let dispatcher = Arc::new(OutboxDispatcher::new(store.clone(), channel.clone()));
    let sweeper = Arc::new(Sweeper::new(reservations.clone(), store.clone()));

    Arc::new(AppState {
        placement: store::PlacementService::new(store.clone()),
        store,
        orchestrator,
        reservations,
        payment_gateway,
        channel,
        dispatcher,
        sweeper,
    })
}
