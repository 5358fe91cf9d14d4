//! Cart service contract and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::UserId;
use domain::{CartLine, CartSnapshot};

use super::{read, simulate_latency, write};
use crate::error::GatewayError;

/// Read and clear a user's cart.
#[async_trait]
pub trait CartGateway: Send + Sync {
    /// Returns a point-in-time snapshot. A user without a cart gets an empty one.
    ///
    /// Fails only with `Unavailable`.
    async fn fetch(&self, user_id: &UserId) -> Result<CartSnapshot, GatewayError>;

    /// Empties the cart. Clearing an empty cart succeeds.
    ///
    /// Fails only with `Unavailable`.
    async fn clear(&self, user_id: &UserId) -> Result<(), GatewayError>;
}

#[derive(Debug, Default)]
struct CartState {
    carts: HashMap<UserId, Vec<CartLine>>,
    unavailable: bool,
    fail_clear_times: u32,
    clear_calls: u32,
    latency: Option<Duration>,
}

/// In-memory cart service for testing and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartService {
    state: Arc<RwLock<CartState>>,
}

impl InMemoryCartService {
    /// Creates a new in-memory cart service with no carts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the user's cart.
    pub fn set_cart(&self, user_id: impl Into<UserId>, lines: Vec<CartLine>) {
        write(&self.state).carts.insert(user_id.into(), lines);
    }

    /// Returns the user's current cart lines.
    pub fn cart(&self, user_id: &UserId) -> Vec<CartLine> {
        read(&self.state)
            .carts
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Configures every call to fail with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        write(&self.state).unavailable = unavailable;
    }

    /// Makes the next `times` clear calls fail.
    pub fn fail_clear_times(&self, times: u32) {
        write(&self.state).fail_clear_times = times;
    }

    /// Returns how many clear calls were received.
    pub fn clear_calls(&self) -> u32 {
        read(&self.state).clear_calls
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        write(&self.state).latency = latency;
    }
}

#[async_trait]
impl CartGateway for InMemoryCartService {
    async fn fetch(&self, user_id: &UserId) -> Result<CartSnapshot, GatewayError> {
        let latency = read(&self.state).latency;
        simulate_latency(latency).await;
        let state = read(&self.state);
        if state.unavailable {
            return Err(GatewayError::Unavailable("cart service down".to_string()));
        }
        Ok(state
            .carts
            .get(user_id)
            .map(|lines| CartSnapshot::new(lines.clone()))
            .unwrap_or_default())
    }

    async fn clear(&self, user_id: &UserId) -> Result<(), GatewayError> {
        let latency = read(&self.state).latency;
        simulate_latency(latency).await;
        let mut state = write(&self.state);
        state.clear_calls += 1;
        if state.unavailable {
            return Err(GatewayError::Unavailable("cart service down".to_string()));
        }
        if state.fail_clear_times > 0 {
            state.fail_clear_times -= 1;
            return Err(GatewayError::Unavailable("cart clear failed".to_string()));
        }
        state.carts.remove(user_id);
        Ok(())
    }
}
