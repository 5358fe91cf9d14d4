//! The immutable, durable order record.

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use super::{Money, OrderError, OrderStatus, PricedLineItem};

/// A completed order as written to the order store.
///
/// Invariant: `total_price` equals the sum of `unit_price * quantity` over
/// `items`, in exact cents. Construction through [`Order::new`] enforces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    order_id: OrderId,
    user_id: UserId,
    items: Vec<PricedLineItem>,
    total_price: Money,
    transaction_id: String,
    status: OrderStatus,
    created_at: DateTime<Utc>,
}

impl Order {
    /// Builds an order, checking the total and line invariants.
    pub fn new(
        order_id: OrderId,
        user_id: UserId,
        items: Vec<PricedLineItem>,
        total_price: Money,
        transaction_id: String,
        status: OrderStatus,
        created_at: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::NoItems);
        }
        if transaction_id.trim().is_empty() {
            return Err(OrderError::TransactionIdRequired);
        }

        let computed = Self::sum_lines(&items)?;
        if computed != total_price {
            return Err(OrderError::TotalMismatch {
                stated: total_price,
                computed,
            });
        }

        Ok(Self {
            order_id,
            user_id,
            items,
            total_price,
            transaction_id,
            status,
            created_at,
        })
    }

    fn sum_lines(items: &[PricedLineItem]) -> Result<Money, OrderError> {
        items.iter().try_fold(Money::zero(), |acc, item| {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    product_id: item.product_id.clone(),
                    quantity: item.quantity,
                });
            }
            if item.unit_price.is_negative() {
                return Err(OrderError::InvalidPrice {
                    product_id: item.product_id.clone(),
                    cents: item.unit_price.cents(),
                });
            }
            item.line_total()
                .and_then(|line| acc.checked_add(line))
                .ok_or(OrderError::AmountOverflow)
        })
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn items(&self) -> &[PricedLineItem] {
        &self.items
    }

    pub fn total_price(&self) -> Money {
        self.total_price
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns true if any line of this order is for the given product.
    pub fn contains_product(&self, product_id: &ProductId) -> bool {
        self.items.iter().any(|item| &item.product_id == product_id)
    }
}
