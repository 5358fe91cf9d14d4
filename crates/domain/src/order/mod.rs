//! Order record and related types.

mod draft;
mod record;
mod state;
mod value_objects;

pub use draft::OrderDraft;
pub use record::Order;
pub use state::OrderStatus;
pub use value_objects::{CartLine, CartSnapshot, CatalogEntry, Money, PricedLineItem};

use common::ProductId;
use thiserror::Error;

/// Errors raised when an order would violate its invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// Invalid quantity.
    #[error("Invalid quantity for {product_id}: {quantity} (must be greater than 0)")]
    InvalidQuantity { product_id: ProductId, quantity: u32 },

    /// Invalid price.
    #[error("Invalid price for {product_id}: {cents} cents (must not be negative)")]
    InvalidPrice { product_id: ProductId, cents: i64 },

    /// Stated total does not equal the sum of the line totals.
    #[error("Total mismatch: stated {stated}, computed {computed}")]
    TotalMismatch { stated: Money, computed: Money },

    /// Arithmetic overflow while totalling.
    #[error("Order total overflows the money representation")]
    AmountOverflow,

    /// Transaction id from the payment processor is missing.
    #[error("Transaction ID is required")]
    TransactionIdRequired,
}
