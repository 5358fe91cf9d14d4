use async_trait::async_trait;
use common::{OrderId, ProductId, UserId};
use domain::Order;

use crate::{OrderStoreError, ProductSales, Result, RevenueSummary, TimeRange};

/// Core trait for order store implementations.
///
/// Only single-document atomicity is assumed: one order is one write.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Writes a new order.
    ///
    /// Fails with `DuplicateOrder` if an order with the same id exists.
    async fn insert(&self, order: &Order) -> Result<()>;

    /// Loads an order by id.
    async fn get(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Returns a user's orders, newest first.
    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Order>>;

    /// Returns orders created inside the window, oldest first.
    async fn list_between(&self, range: TimeRange) -> Result<Vec<Order>>;

    /// Returns true if any of the user's orders contains the product.
    async fn has_purchased(&self, user_id: &UserId, product_id: &ProductId) -> Result<bool>;

    /// Sums order totals created inside the window.
    async fn revenue(&self, range: TimeRange) -> Result<RevenueSummary>;

    /// Best-selling products by units sold, ties broken by product id.
    async fn top_products(&self, limit: usize) -> Result<Vec<ProductSales>>;
}

/// Result of an idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The order was written by this call.
    Inserted,
    /// An identical order was already present.
    AlreadyPresent,
}

/// Extension trait providing convenience methods for order stores.
#[async_trait]
pub trait OrderStoreExt: OrderStore {
    /// Inserts the order unless the same order is already stored.
    ///
    /// Used when re-driving a write whose first outcome was unknown. A
    /// different order stored under the same id is still a conflict.
    async fn insert_idempotent(&self, order: &Order) -> Result<InsertOutcome> {
        match self.insert(order).await {
            Ok(()) => Ok(InsertOutcome::Inserted),
            Err(OrderStoreError::DuplicateOrder(order_id)) => match self.get(order_id).await? {
                Some(existing) if same_document(&existing, order) => {
                    Ok(InsertOutcome::AlreadyPresent)
                }
                _ => Err(OrderStoreError::DuplicateOrder(order_id)),
            },
            Err(e) => Err(e),
        }
    }
}

// Blanket implementation for all OrderStore implementations
impl<T: OrderStore + ?Sized> OrderStoreExt for T {}

// Timestamps may lose sub-microsecond precision in storage, so compare
// everything but the creation time exactly.
fn same_document(stored: &Order, candidate: &Order) -> bool {
    stored.order_id() == candidate.order_id()
        && stored.user_id() == candidate.user_id()
        && stored.items() == candidate.items()
        && stored.total_price() == candidate.total_price()
        && stored.transaction_id() == candidate.transaction_id()
}
