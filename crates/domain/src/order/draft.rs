//! In-flight order accumulated while the saga prices the cart.

use chrono::{DateTime, Utc};
use common::{OrderId, UserId};

use super::{Money, Order, OrderError, OrderStatus, PricedLineItem};

/// Accumulates priced lines and a running total before anything is durable.
///
/// Discarded on any failure before persistence. The `order_id` is fixed at
/// creation so retries and reconciliation refer to the same order.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    order_id: OrderId,
    user_id: UserId,
    items: Vec<PricedLineItem>,
    total: Money,
}

impl OrderDraft {
    /// Starts an empty draft for the given user.
    pub fn new(order_id: OrderId, user_id: UserId) -> Self {
        Self {
            order_id,
            user_id,
            items: Vec::new(),
            total: Money::zero(),
        }
    }

    /// Appends a priced line and adds its line total to the running total.
    pub fn push(&mut self, item: PricedLineItem) -> Result<(), OrderError> {
        if item.quantity == 0 {
            return Err(OrderError::InvalidQuantity {
                product_id: item.product_id,
                quantity: item.quantity,
            });
        }
        if item.unit_price.is_negative() {
            return Err(OrderError::InvalidPrice {
                product_id: item.product_id,
                cents: item.unit_price.cents(),
            });
        }
        let line_total = item.line_total().ok_or(OrderError::AmountOverflow)?;
        self.total = self
            .total
            .checked_add(line_total)
            .ok_or(OrderError::AmountOverflow)?;
        self.items.push(item);
        Ok(())
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

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Freezes the draft into the immutable order written at the commit point.
    pub fn into_order(
        self,
        transaction_id: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Order, OrderError> {
        Order::new(
            self.order_id,
            self.user_id,
            self.items,
            self.total,
            transaction_id.into(),
            OrderStatus::Completed,
            created_at,
        )
    }
}
