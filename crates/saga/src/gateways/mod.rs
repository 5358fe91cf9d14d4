//! Downstream service contracts the saga calls through.
//!
//! Each module holds one trait plus a seedable in-memory implementation
//! with failure injection. [`http`] holds the reqwest-backed clients for
//! the real services.

pub mod cart;
pub mod catalog;
pub mod http;
pub mod inventory;
pub mod payment;

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

pub use cart::{CartGateway, InMemoryCartService};
pub use catalog::{CatalogGateway, InMemoryCatalogService};
pub use http::{HttpCartGateway, HttpCatalogGateway, HttpInventoryGateway, HttpPaymentGateway};
pub use inventory::{InMemoryInventoryService, InventoryGateway};
pub use payment::{InMemoryPaymentService, PaymentGateway, PaymentReceipt};

// A panic while holding one of these locks cannot leave the plain maps
// half-updated, so poisoning is ignored.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

async fn simulate_latency(latency: Option<Duration>) {
    if let Some(delay) = latency {
        tokio::time::sleep(delay).await;
    }
}
