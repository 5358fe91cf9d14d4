//! Inventory service contract and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::ProductId;

use super::{read, simulate_latency, write};
use crate::error::GatewayError;

/// Stock levels, changed only through atomic conditional operations.
#[async_trait]
pub trait InventoryGateway: Send + Sync {
    /// Decrements stock by `quantity` only if at least that much remains.
    ///
    /// The check and the decrement are one atomic step. Fails with
    /// `InsufficientStock`, `NotFound` or `Unavailable`.
    async fn decrement(&self, product_id: &ProductId, quantity: u32) -> Result<(), GatewayError>;

    /// Adds `quantity` back. Used only for compensation.
    ///
    /// Fails only with `Unavailable`.
    async fn increment(&self, product_id: &ProductId, quantity: u32) -> Result<(), GatewayError>;
}

#[derive(Debug, Default)]
struct InventoryState {
    stock: HashMap<ProductId, u32>,
    unavailable: bool,
    unavailable_for: Option<ProductId>,
    fail_increment_times: u32,
    decrement_calls: u32,
    latency: Option<Duration>,
}

/// In-memory inventory for testing and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryService {
    state: Arc<RwLock<InventoryState>>,
}

impl InMemoryInventoryService {
    /// Creates a new inventory with no products.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the stock level of a product.
    pub fn set_stock(&self, product_id: impl Into<ProductId>, quantity: u32) {
        write(&self.state).stock.insert(product_id.into(), quantity);
    }

    /// Returns the stock level of a product, if it is known.
    pub fn stock(&self, product_id: &ProductId) -> Option<u32> {
        read(&self.state).stock.get(product_id).copied()
    }

    /// Configures every call to fail with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        write(&self.state).unavailable = unavailable;
    }

    /// Makes decrements of one product fail with `Unavailable`.
    pub fn set_unavailable_for(&self, product_id: Option<ProductId>) {
        write(&self.state).unavailable_for = product_id;
    }

    /// Makes the next `times` increments fail.
    pub fn fail_increment_times(&self, times: u32) {
        write(&self.state).fail_increment_times = times;
    }

    /// Returns how many decrement calls were received.
    pub fn decrement_calls(&self) -> u32 {
        read(&self.state).decrement_calls
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        write(&self.state).latency = latency;
    }
}

#[async_trait]
impl InventoryGateway for InMemoryInventoryService {
    async fn decrement(&self, product_id: &ProductId, quantity: u32) -> Result<(), GatewayError> {
        let latency = read(&self.state).latency;
        simulate_latency(latency).await;

        let mut state = write(&self.state);
        state.decrement_calls += 1;
        if state.unavailable || state.unavailable_for.as_ref() == Some(product_id) {
            return Err(GatewayError::Unavailable(
                "inventory service down".to_string(),
            ));
        }
        let available = state
            .stock
            .get_mut(product_id)
            .ok_or(GatewayError::NotFound)?;
        if *available < quantity {
            return Err(GatewayError::InsufficientStock);
        }
        *available -= quantity;
        Ok(())
    }

    async fn increment(&self, product_id: &ProductId, quantity: u32) -> Result<(), GatewayError> {
        let latency = read(&self.state).latency;
        simulate_latency(latency).await;

        let mut state = write(&self.state);
        if state.unavailable {
            return Err(GatewayError::Unavailable(
                "inventory service down".to_string(),
            ));
        }
        if state.fail_increment_times > 0 {
            state.fail_increment_times -= 1;
            return Err(GatewayError::Unavailable("increment failed".to_string()));
        }
        let level = state.stock.entry(product_id.clone()).or_insert(0);
        *level = level.saturating_add(quantity);
        Ok(())
    }
}
