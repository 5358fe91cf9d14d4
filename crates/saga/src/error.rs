//! Saga error types.

use common::{OrderId, ProductId};
use thiserror::Error;

/// Downstream dependency a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Cart,
    Catalog,
    Inventory,
    Payment,
    OrderStore,
}

impl Service {
    /// Returns the service name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Cart => "cart",
            Service::Catalog => "catalog",
            Service::Inventory => "inventory",
            Service::Payment => "payment",
            Service::OrderStore => "order_store",
        }
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a downstream gateway.
///
/// Which variants a call can produce is part of each gateway's contract;
/// the orchestrator maps them onto [`SagaError`] per step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The addressed product does not exist.
    #[error("not found")]
    NotFound,

    /// A conditional stock decrement was refused.
    #[error("insufficient stock")]
    InsufficientStock,

    /// The payment processor declined the charge.
    #[error("declined: {0}")]
    Declined(String),

    /// Network error, timeout or unexpected response.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The call was accepted but its result could not be read back.
    ///
    /// For a charge this means money may have moved without a receipt.
    #[error("outcome unknown: {0}")]
    Ambiguous(String),
}

/// Errors returned from order creation.
///
/// Everything up to and including a declined or failed charge is
/// retry-safe: no side effects remain once compensation has run. The
/// exceptions are [`SagaError::PaymentUnconfirmed`] and
/// [`SagaError::PersistenceAmbiguous`], where money may have moved, and
/// [`SagaError::Internal`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SagaError {
    /// The user's cart has no lines.
    #[error("cart is empty")]
    EmptyCart,

    /// The cart contents cannot be ordered as-is.
    #[error("invalid cart: {0}")]
    InvalidCart(String),

    /// A cart product is missing from the catalog.
    #[error("product {product_id} is unavailable")]
    ProductUnavailable { product_id: ProductId },

    /// A stock decrement was refused.
    #[error("insufficient stock for product {product_id}")]
    InsufficientStock { product_id: ProductId },

    /// The charge was declined.
    #[error("payment declined: {reason}")]
    PaymentDeclined { reason: String },

    /// A downstream service could not be reached or timed out.
    #[error("{service} service unavailable: {reason}")]
    UpstreamUnavailable { service: Service, reason: String },

    /// The saga deadline elapsed before the commit point.
    #[error("order creation timed out")]
    OrderTimedOut,

    /// The processor accepted the charge but returned no usable receipt.
    ///
    /// Stock stays reserved and a reconciliation record was written.
    #[error("payment for order {order_id} may have been captured: {reason}")]
    PaymentUnconfirmed { order_id: OrderId, reason: String },

    /// Payment was captured but the order write did not confirm.
    ///
    /// The order may or may not exist; a reconciliation record was written.
    #[error("order {order_id} outcome unknown after payment {transaction_id}")]
    PersistenceAmbiguous {
        order_id: OrderId,
        transaction_id: String,
    },

    /// An invariant broke inside the orchestrator itself.
    #[error("internal saga error: {0}")]
    Internal(String),
}

impl SagaError {
    /// Machine-readable failure kind, used for metric labels and responses.
    pub fn kind(&self) -> &'static str {
        match self {
            SagaError::EmptyCart => "empty_cart",
            SagaError::InvalidCart(_) => "invalid_cart",
            SagaError::ProductUnavailable { .. } => "product_unavailable",
            SagaError::InsufficientStock { .. } => "insufficient_stock",
            SagaError::PaymentDeclined { .. } => "payment_declined",
            SagaError::UpstreamUnavailable { .. } => "upstream_unavailable",
            SagaError::OrderTimedOut => "order_timed_out",
            SagaError::PaymentUnconfirmed { .. } => "payment_unconfirmed",
            SagaError::PersistenceAmbiguous { .. } => "persistence_ambiguous",
            SagaError::Internal(_) => "internal",
        }
    }

    /// Returns true if the caller may simply try again.
    pub fn is_retry_safe(&self) -> bool {
        !matches!(
            self,
            SagaError::PaymentUnconfirmed { .. }
                | SagaError::PersistenceAmbiguous { .. }
                | SagaError::Internal(_)
        )
    }

    /// Returns true if money may have moved without a confirmed order.
    pub fn outcome_unknown(&self) -> bool {
        matches!(
            self,
            SagaError::PaymentUnconfirmed { .. } | SagaError::PersistenceAmbiguous { .. }
        )
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
