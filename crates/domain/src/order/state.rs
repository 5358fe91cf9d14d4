//! Order status.

use serde::{Deserialize, Serialize};

/// Status recorded on a durable order.
///
/// An order is only ever written after payment capture, so every durable
/// order starts out `Completed`. The enum leaves room for post-commit states
/// that are reconciled rather than rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Paid, persisted and visible in the user's history.
    #[default]
    Completed,
}

impl OrderStatus {
    /// Returns the status as it appears on the wire and in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(OrderStatus::Completed),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}
