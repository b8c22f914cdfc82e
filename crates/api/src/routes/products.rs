//! Product catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::{Currency, Money, Product, ProductId};
use serde::{Deserialize, Serialize};
use store::{InventoryLedger, OrderStore};

use crate::error::ApiError;
use crate::routes::orders::AppState;

#[derive(Deserialize)]
pub struct UpsertProductRequest {
    pub product_id: String,
    pub stock: u32,
    pub price_minor: i64,
    pub currency: String,
    #[serde(default)]
    pub flash_sale: bool,
}

#[derive(Serialize)]
pub struct ProductResponse {
    pub product_id: String,
    pub stock: u32,
    pub version: i64,
    pub price_minor: i64,
    pub currency: String,
    pub flash_sale: bool,
}

impl From<&Product> for ProductResponse {
    fn from(product: &Product) -> Self {
        Self {
            product_id: product.product_id.to_string(),
            stock: product.stock,
            version: product.version.as_i64(),
            price_minor: product.price.minor_units(),
            currency: product.price.currency().code().to_string(),
            flash_sale: product.flash_sale,
        }
    }
}

/// POST /products — creates or replaces a product.
pub async fn upsert<S: OrderStore + InventoryLedger>(
    State(state): State<Arc<AppState<S>>>,
    Json(request): Json<UpsertProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let currency = Currency::from_code(&request.currency)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown currency '{}'", request.currency)))?;

    let product = Product::new(
        request.product_id,
        request.stock,
        Money::new(request.price_minor, currency),
    )
    .flash_sale(request.flash_sale);

    state
        .store
        .upsert_product(product.clone())
        .await
        .map_err(ApiError::Store)?;

    Ok((StatusCode::CREATED, Json(ProductResponse::from(&product))))
}

/// GET /products/{id} — returns the product's ledger record.
pub async fn get<S: OrderStore + InventoryLedger>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product_id = ProductId::new(id);
    let product = state
        .store
        .product(&product_id)
        .await
        .map_err(ApiError::Store)?
        .ok_or_else(|| ApiError::NotFound(format!("product not found: {product_id}")))?;

    Ok(Json(ProductResponse::from(&product)))
}
