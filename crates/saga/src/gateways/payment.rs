//! Payment service contract and in-memory implementation.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::{OrderId, UserId};
use domain::Money;
use uuid::Uuid;

use super::{read, simulate_latency, write};
use crate::error::GatewayError;

/// Result of a successful charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    /// Processor reference for the charge.
    pub transaction_id: String,
}

/// Charges users. There is no refund operation.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charges `amount` to the user. `order_id` is passed as a reference only.
    ///
    /// Fails with `Declined` or `Unavailable`.
    async fn charge(
        &self,
        order_id: OrderId,
        user_id: &UserId,
        amount: Money,
    ) -> Result<PaymentReceipt, GatewayError>;
}

/// A charge accepted by the in-memory processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charge {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: Money,
    pub transaction_id: String,
}

#[derive(Debug, Default)]
struct PaymentState {
    charges: Vec<Charge>,
    decline_reason: Option<String>,
    unavailable: bool,
    latency: Option<Duration>,
}

/// In-memory payment processor for testing and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentService {
    state: Arc<RwLock<PaymentState>>,
}

impl InMemoryPaymentService {
    /// Creates a processor that accepts every charge.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declines every charge with `reason` until cleared with `None`.
    pub fn set_decline_reason(&self, reason: Option<String>) {
        write(&self.state).decline_reason = reason;
    }

    /// Configures every call to fail with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        write(&self.state).unavailable = unavailable;
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        write(&self.state).latency = latency;
    }

    /// Returns every accepted charge in order.
    pub fn charges(&self) -> Vec<Charge> {
        read(&self.state).charges.clone()
    }

    /// Returns the number of accepted charges.
    pub fn charge_count(&self) -> usize {
        read(&self.state).charges.len()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentService {
    async fn charge(
        &self,
        order_id: OrderId,
        user_id: &UserId,
        amount: Money,
    ) -> Result<PaymentReceipt, GatewayError> {
        let latency = read(&self.state).latency;
        simulate_latency(latency).await;

        let mut state = write(&self.state);
        if state.unavailable {
            return Err(GatewayError::Unavailable("payment service down".to_string()));
        }
        if let Some(reason) = &state.decline_reason {
            return Err(GatewayError::Declined(reason.clone()));
        }

        let transaction_id = format!("txn_{}", Uuid::new_v4().simple());
        state.charges.push(Charge {
            order_id,
            user_id: user_id.clone(),
            amount,
            transaction_id: transaction_id.clone(),
        });
        Ok(PaymentReceipt { transaction_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_charge_records_transaction() {
        let payment = InMemoryPaymentService::new();
        let receipt = payment
            .charge(OrderId::new(), &UserId::new("u1"), Money::from_cents(500))
            .await
            .unwrap();

        assert!(receipt.transaction_id.starts_with("txn_"));
        let charges = payment.charges();
        assert_eq!(charges.len(), 1);
        assert_eq!(charges[0].amount, Money::from_cents(500));
        assert_eq!(charges[0].transaction_id, receipt.transaction_id);
    }

    #[tokio::test]
    async fn test_decline_moves_no_money() {
        let payment = InMemoryPaymentService::new();
        payment.set_decline_reason(Some("insufficient funds".to_string()));

        let err = payment
            .charge(OrderId::new(), &UserId::new("u1"), Money::from_cents(500))
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::Declined("insufficient funds".to_string()));
        assert_eq!(payment.charge_count(), 0);
    }
}
