//! Order placement and lookup endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{OrderId, UserId};
use domain::{Order, ProductId};
use reservation::{ReservationService, Sweeper};
use saga::{InMemoryPaymentGateway, SagaOrchestrator};
use serde::{Deserialize, Serialize};
use store::{
    CreateOrder, InMemoryEventChannel, InventoryLedger, OrderStore, OutboxDispatcher,
    PlacementService,
};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: OrderStore + InventoryLedger> {
    pub placement: PlacementService<S>,
    pub store: S,
    pub orchestrator: Arc<SagaOrchestrator<S>>,
    pub reservations: ReservationService<S>,
    pub payment_gateway: Arc<InMemoryPaymentGateway>,
    pub channel: Arc<InMemoryEventChannel>,
    pub dispatcher: Arc<OutboxDispatcher<S>>,
    pub sweeper: Arc<Sweeper<S, S>>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    /// Omitted for anonymous checkout; a user ID is generated.
    pub user_id: Option<uuid::Uuid>,
    pub product_id: String,
    pub quantity: u32,
}

// -- Response types --

#[derive(Serialize)]
pub struct MoneyResponse {
    pub minor_units: i64,
    pub currency: String,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub user_id: String,
    pub product_id: String,
    pub quantity: u32,
    pub status: String,
    pub total_price: MoneyResponse,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.order_id().to_string(),
            user_id: order.user_id().to_string(),
            product_id: order.product_id().to_string(),
            quantity: order.quantity().get(),
            status: order.status().to_string(),
            total_price: MoneyResponse {
                minor_units: order.total_price().minor_units(),
                currency: order.total_price().currency().code().to_string(),
            },
        }
    }
}

/// POST /orders — places an order.
///
/// Regular products return `Confirmed` (or an error); flash-sale
/// products return `Pending` and the caller polls for the outcome.
pub async fn create<S: OrderStore + InventoryLedger>(
    State(state): State<Arc<AppState<S>>>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let user_id = request
        .user_id
        .map(UserId::from_uuid)
        .unwrap_or_default();

    let order = state
        .placement
        .place_order(CreateOrder {
            user_id,
            product_id: ProductId::new(request.product_id),
            quantity: request.quantity,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(OrderResponse::from(&order))))
}

/// GET /orders/{id} — returns the order's current state.
pub async fn get<S: OrderStore + InventoryLedger>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<uuid::Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = OrderId::from_uuid(id);
    let order = state
        .store
        .get_order(order_id)
        .await
        .map_err(ApiError::Store)?
        .ok_or_else(|| ApiError::NotFound(format!("order not found: {order_id}")))?;

    Ok(Json(OrderResponse::from(&order)))
}
