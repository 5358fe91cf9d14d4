//! reqwest-backed gateways for the cart, catalog, inventory and payment services.
//!
//! Per-call timeouts are enforced by the orchestrator, so the clients here
//! only translate between JSON over HTTP and the gateway contracts.

use async_trait::async_trait;
use common::{OrderId, ProductId, UserId};
use domain::{CartSnapshot, CatalogEntry, Money};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{CartGateway, CatalogGateway, InventoryGateway, PaymentGateway, PaymentReceipt};
use crate::error::GatewayError;

fn unavailable(e: reqwest::Error) -> GatewayError {
    GatewayError::Unavailable(e.to_string())
}

fn unexpected(status: StatusCode) -> GatewayError {
    GatewayError::Unavailable(format!("unexpected status {status}"))
}

fn join(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Cart service client: `GET /cart/{user}`, `POST /cart/{user}/clear`.
#[derive(Debug, Clone)]
pub struct HttpCartGateway {
    client: Client,
    base_url: String,
}

impl HttpCartGateway {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl CartGateway for HttpCartGateway {
    #[tracing::instrument(skip(self), fields(service = "cart"))]
    async fn fetch(&self, user_id: &UserId) -> Result<CartSnapshot, GatewayError> {
        let url = join(&self.base_url, &format!("/cart/{user_id}"));
        let response = self.client.get(&url).send().await.map_err(unavailable)?;

        match response.status() {
            // A user who never added anything has no cart.
            StatusCode::NOT_FOUND => Ok(CartSnapshot::default()),
            status if status.is_success() => response.json().await.map_err(unavailable),
            status => Err(unexpected(status)),
        }
    }

    #[tracing::instrument(skip(self), fields(service = "cart"))]
    async fn clear(&self, user_id: &UserId) -> Result<(), GatewayError> {
        let url = join(&self.base_url, &format!("/cart/{user_id}/clear"));
        let response = self.client.post(&url).send().await.map_err(unavailable)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(unexpected(response.status()))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProductBody {
    name: String,
    price: f64,
    #[serde(default)]
    owner_id: Option<String>,
}

/// Product catalog client: `GET /products/{id}`.
///
/// Prices arrive as decimals and are rounded to cents once, here.
#[derive(Debug, Clone)]
pub struct HttpCatalogGateway {
    client: Client,
    base_url: String,
}

impl HttpCatalogGateway {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl CatalogGateway for HttpCatalogGateway {
    #[tracing::instrument(skip(self), fields(service = "catalog"))]
    async fn resolve(&self, product_id: &ProductId) -> Result<CatalogEntry, GatewayError> {
        let url = join(&self.base_url, &format!("/products/{product_id}"));
        let response = self.client.get(&url).send().await.map_err(unavailable)?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(GatewayError::NotFound),
            status if status.is_success() => {
                let body: ProductBody = response.json().await.map_err(unavailable)?;
                let unit_price = Money::from_decimal(body.price).ok_or_else(|| {
                    GatewayError::Unavailable(format!("invalid price {}", body.price))
                })?;
                Ok(CatalogEntry {
                    name: body.name,
                    unit_price,
                    owner_id: UserId::new(body.owner_id.unwrap_or_default()),
                })
            }
            status => Err(unexpected(status)),
        }
    }
}

#[derive(Debug, Serialize)]
struct StockChange<'a> {
    product_id: &'a ProductId,
    quantity: u32,
}

/// Inventory client: `POST /inventory/decrease`, `POST /inventory/increase`.
#[derive(Debug, Clone)]
pub struct HttpInventoryGateway {
    client: Client,
    base_url: String,
}

impl HttpInventoryGateway {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn post(
        &self,
        path: &str,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<StatusCode, GatewayError> {
        let response = self
            .client
            .post(join(&self.base_url, path))
            .json(&StockChange {
                product_id,
                quantity,
            })
            .send()
            .await
            .map_err(unavailable)?;
        Ok(response.status())
    }
}

#[async_trait]
impl InventoryGateway for HttpInventoryGateway {
    #[tracing::instrument(skip(self), fields(service = "inventory"))]
    async fn decrement(&self, product_id: &ProductId, quantity: u32) -> Result<(), GatewayError> {
        match self.post("/inventory/decrease", product_id, quantity).await? {
            status if status.is_success() => Ok(()),
            StatusCode::BAD_REQUEST | StatusCode::CONFLICT => Err(GatewayError::InsufficientStock),
            StatusCode::NOT_FOUND => Err(GatewayError::NotFound),
            status => Err(unexpected(status)),
        }
    }

    #[tracing::instrument(skip(self), fields(service = "inventory"))]
    async fn increment(&self, product_id: &ProductId, quantity: u32) -> Result<(), GatewayError> {
        match self.post("/inventory/increase", product_id, quantity).await? {
            status if status.is_success() => Ok(()),
            status => Err(unexpected(status)),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChargeRequest<'a> {
    user_id: &'a UserId,
    amount: f64,
    order_id: OrderId,
}

#[derive(Debug, Deserialize)]
struct ChargeResponse {
    #[serde(default)]
    transaction_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Payment processor client: `POST /payment/process`.
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    client: Client,
    base_url: String,
}

impl HttpPaymentGateway {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[tracing::instrument(skip(self), fields(service = "payment"))]
    async fn charge(
        &self,
        order_id: OrderId,
        user_id: &UserId,
        amount: Money,
    ) -> Result<PaymentReceipt, GatewayError> {
        let response = self
            .client
            .post(join(&self.base_url, "/payment/process"))
            .json(&ChargeRequest {
                user_id,
                amount: amount.to_decimal(),
                order_id,
            })
            .send()
            .await
            .map_err(unavailable)?;

        match response.status() {
            StatusCode::PAYMENT_REQUIRED => {
                let reason = response
                    .json::<ChargeResponse>()
                    .await
                    .ok()
                    .and_then(|body| body.error);
                Err(GatewayError::Declined(
                    reason.unwrap_or_else(|| "declined".to_string()),
                ))
            }
            // The processor took the charge; anything unreadable past this
            // point leaves the money moved.
            status if status.is_success() => {
                let body: ChargeResponse = response
                    .json()
                    .await
                    .map_err(|e| GatewayError::Ambiguous(format!("unreadable receipt: {e}")))?;
                match body.transaction_id {
                    Some(id) if !id.trim().is_empty() => Ok(PaymentReceipt { transaction_id: id }),
                    _ => Err(GatewayError::Ambiguous(
                        "charge accepted without a transaction id".to_string(),
                    )),
                }
            }
            status => Err(unexpected(status)),
        }
    }
}
