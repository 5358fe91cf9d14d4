//! Catalog service contract and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::{ProductId, UserId};
use domain::{CatalogEntry, Money};

use super::{read, simulate_latency, write};
use crate::error::GatewayError;

/// Authoritative product lookup.
#[async_trait]
pub trait CatalogGateway: Send + Sync {
    /// Resolves the current name, price and owner of a product.
    ///
    /// Fails with `NotFound` or `Unavailable`.
    async fn resolve(&self, product_id: &ProductId) -> Result<CatalogEntry, GatewayError>;
}

#[derive(Debug, Default)]
struct CatalogState {
    products: HashMap<ProductId, CatalogEntry>,
    unavailable: bool,
    latency: Option<Duration>,
}

/// In-memory catalog for testing and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalogService {
    state: Arc<RwLock<CatalogState>>,
}

impl InMemoryCatalogService {
    /// Creates a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a product.
    pub fn add_product(
        &self,
        product_id: impl Into<ProductId>,
        name: impl Into<String>,
        unit_price: Money,
        owner_id: impl Into<UserId>,
    ) {
        write(&self.state).products.insert(
            product_id.into(),
            CatalogEntry {
                name: name.into(),
                unit_price,
                owner_id: owner_id.into(),
            },
        );
    }

    /// Removes a product so later lookups miss.
    pub fn remove_product(&self, product_id: &ProductId) {
        write(&self.state).products.remove(product_id);
    }

    /// Configures every call to fail with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        write(&self.state).unavailable = unavailable;
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        write(&self.state).latency = latency;
    }
}

#[async_trait]
impl CatalogGateway for InMemoryCatalogService {
    async fn resolve(&self, product_id: &ProductId) -> Result<CatalogEntry, GatewayError> {
        let latency = read(&self.state).latency;
        simulate_latency(latency).await;
        let state = read(&self.state);
        if state.unavailable {
            return Err(GatewayError::Unavailable("catalog service down".to_string()));
        }
        state
            .products
            .get(product_id)
            .cloned()
            .ok_or(GatewayError::NotFound)
    }
}
