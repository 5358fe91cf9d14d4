use chrono::{DateTime, Utc};
use common::ProductId;
use domain::Money;
use serde::{Deserialize, Serialize};

/// Half-open creation-time window: `from` inclusive, `to` exclusive.
///
/// Either bound may be left open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// A range with no bounds.
    pub fn all() -> Self {
        Self::default()
    }

    /// A range bounded on both sides.
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    /// Sets the inclusive lower bound.
    pub fn from(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    /// Sets the exclusive upper bound.
    pub fn to(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }

    /// Returns true if the timestamp falls inside the window.
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| timestamp >= from) && self.to.is_none_or(|to| timestamp < to)
    }
}

/// Revenue over a time window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueSummary {
    pub order_count: u64,
    pub total_revenue: Money,
}

/// Units and revenue for one product across all orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSales {
    pub product_id: ProductId,
    /// Name from the most recent order containing the product.
    pub name: String,
    pub units_sold: u64,
    pub revenue: Money,
}
