//! Order creation, history and purchase-check endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use common::{ProductId, UserId};
use domain::Order;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

/// Header carrying the client's deduplication key for order creation.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

// -- Request types --

#[derive(Deserialize)]
pub struct CheckPurchaseRequest {
    pub user_id: String,
    pub product_id: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderCreatedResponse {
    pub order_id: String,
    pub status: String,
    pub total_cents: i64,
    pub transaction_id: String,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub user_id: String,
    pub status: String,
    pub items: Vec<OrderItemResponse>,
    pub total_cents: i64,
    pub transaction_id: String,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub owner_id: String,
}

#[derive(Serialize)]
pub struct CheckPurchaseResponse {
    pub has_purchased: bool,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.order_id().to_string(),
            user_id: order.user_id().to_string(),
            status: order.status().to_string(),
            items: order
                .items()
                .iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id.to_string(),
                    name: item.name.clone(),
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price.cents(),
                    owner_id: item.owner_id.to_string(),
                })
                .collect(),
            total_cents: order.total_price().cents(),
            transaction_id: order.transaction_id().to_string(),
            created_at: order.created_at().to_rfc3339(),
        }
    }
}

// -- Handlers --

/// POST /orders/create/{user_id}: turn the user's cart into an order.
///
/// With an `Idempotency-Key` header, repeats of the same key for the same
/// user get the first outcome instead of a second order.
#[tracing::instrument(skip(state, headers))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<OrderCreatedResponse>), ApiError> {
    let user_id = parse_user_id(&user_id)?;
    let key = idempotency_key(&headers)?;

    let result = match key {
        Some(key) => {
            state
                .orchestrator
                .create_order_idempotent(user_id, &key)
                .await
        }
        None => state.orchestrator.create_order(user_id).await,
    };

    let outcome = match &result {
        Ok(_) => "created",
        Err(e) => e.kind(),
    };
    metrics::counter!("http_order_requests_total", "outcome" => outcome).increment(1);

    let receipt = result?;
    let response = OrderCreatedResponse {
        order_id: receipt.order_id.to_string(),
        status: receipt.status.to_string(),
        total_cents: receipt.total_price.cents(),
        transaction_id: receipt.transaction_id,
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /orders/{user_id}: the user's orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    let orders = state.store().list_for_user(&user_id).await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// POST /orders/check-purchase: whether a user has bought a product.
#[tracing::instrument(skip(state, req))]
pub async fn check_purchase(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CheckPurchaseRequest>,
) -> Result<Json<CheckPurchaseResponse>, ApiError> {
    let user_id = parse_user_id(&req.user_id)?;
    if req.product_id.trim().is_empty() {
        return Err(ApiError::BadRequest("product_id is required".to_string()));
    }
    let product_id = ProductId::new(req.product_id);

    let has_purchased = state
        .store()
        .has_purchased(&user_id, &product_id)
        .await?;
    Ok(Json(CheckPurchaseResponse { has_purchased }))
}

fn parse_user_id(id: &str) -> Result<UserId, ApiError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ApiError::BadRequest("user_id is required".to_string()));
    }
    Ok(UserId::new(id))
}

fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    let Some(value) = headers.get(IDEMPOTENCY_KEY_HEADER) else {
        return Ok(None);
    };
    let key = value
        .to_str()
        .map_err(|_| ApiError::BadRequest("Idempotency-Key must be visible ASCII".to_string()))?
        .trim();
    if key.is_empty() {
        return Err(ApiError::BadRequest("Idempotency-Key is empty".to_string()));
    }
    Ok(Some(key.to_string()))
}
