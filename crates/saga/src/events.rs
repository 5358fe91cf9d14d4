//! Saga journal events.
//!
//! Every saga keeps an in-memory journal of what it did. The journal is
//! attached to reconciliation records so an operator can see exactly which
//! side effects were applied before something went wrong.

use chrono::{DateTime, Utc};
use common::ProductId;
use domain::Money;
use serde::{Deserialize, Serialize};

use crate::state::SagaState;

/// Events recorded while a saga executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SagaEvent {
    /// The saga moved between states.
    Transitioned(TransitionData),

    /// A stock decrement was applied.
    StockReserved(StockData),

    /// A stock decrement was undone.
    StockRestored(StockData),

    /// A stock increment failed after every retry.
    CompensationFailed(CompensationFailedData),

    /// The order total was charged.
    PaymentCaptured(PaymentData),

    /// The cart could not be cleared inline.
    CartClearDeferred(FailureData),

    /// The saga ended in failure.
    SagaFailed(FailureData),
}

impl SagaEvent {
    /// Returns the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            SagaEvent::Transitioned(_) => "Transitioned",
            SagaEvent::StockReserved(_) => "StockReserved",
            SagaEvent::StockRestored(_) => "StockRestored",
            SagaEvent::CompensationFailed(_) => "CompensationFailed",
            SagaEvent::PaymentCaptured(_) => "PaymentCaptured",
            SagaEvent::CartClearDeferred(_) => "CartClearDeferred",
            SagaEvent::SagaFailed(_) => "SagaFailed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionData {
    pub from: SagaState,
    pub to: SagaState,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockData {
    pub product_id: ProductId,
    pub quantity: u32,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationFailedData {
    pub product_id: ProductId,
    pub quantity: u32,
    pub error: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentData {
    pub transaction_id: String,
    pub amount: Money,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureData {
    pub reason: String,
    pub at: DateTime<Utc>,
}

// Convenience constructors
impl SagaEvent {
    pub fn transitioned(from: SagaState, to: SagaState) -> Self {
        SagaEvent::Transitioned(TransitionData {
            from,
            to,
            at: Utc::now(),
        })
    }

    pub fn stock_reserved(product_id: ProductId, quantity: u32) -> Self {
        SagaEvent::StockReserved(StockData {
            product_id,
            quantity,
            at: Utc::now(),
        })
    }

    pub fn stock_restored(product_id: ProductId, quantity: u32) -> Self {
        SagaEvent::StockRestored(StockData {
            product_id,
            quantity,
            at: Utc::now(),
        })
    }

    pub fn compensation_failed(
        product_id: ProductId,
        quantity: u32,
        error: impl Into<String>,
    ) -> Self {
        SagaEvent::CompensationFailed(CompensationFailedData {
            product_id,
            quantity,
            error: error.into(),
            at: Utc::now(),
        })
    }

    pub fn payment_captured(transaction_id: impl Into<String>, amount: Money) -> Self {
        SagaEvent::PaymentCaptured(PaymentData {
            transaction_id: transaction_id.into(),
            amount,
            at: Utc::now(),
        })
    }

    pub fn cart_clear_deferred(reason: impl Into<String>) -> Self {
        SagaEvent::CartClearDeferred(FailureData {
            reason: reason.into(),
            at: Utc::now(),
        })
    }

    pub fn saga_failed(reason: impl Into<String>) -> Self {
        SagaEvent::SagaFailed(FailureData {
            reason: reason.into(),
            at: Utc::now(),
        })
    }
}
