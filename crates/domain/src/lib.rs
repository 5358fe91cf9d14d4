//! Domain layer for the order services.
//!
//! This crate provides the value types the order-creation saga works with:
//! - `Money` in integer cents, so totals never drift
//! - `CartSnapshot` / `CartLine` read from the cart service
//! - `PricedLineItem` frozen from the catalog at order time
//! - `OrderDraft`, the in-flight accumulation of a saga
//! - `Order`, the immutable durable record

pub mod order;

pub use common::{OrderId, ProductId, UserId};
pub use order::{
    CartLine, CartSnapshot, CatalogEntry, Money, Order, OrderDraft, OrderError, OrderStatus,
    PricedLineItem,
};
