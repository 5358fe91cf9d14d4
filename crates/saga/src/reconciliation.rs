//! Records of side effects that need an operator or a replay to fix.
//!
//! The saga never loses track of money or stock silently: when a
//! compensation gives up, when a charge or the order write after it cannot
//! be confirmed, or when a cart cannot be cleared, a record lands here with the full saga
//! journal attached.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, UserId};
use domain::{Money, Order, PricedLineItem};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::events::SagaEvent;

/// What needs reconciling.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconciliationKind {
    /// A stock decrement could not be undone; the count is `quantity` too low.
    StockDiscrepancy {
        product_id: ProductId,
        quantity: u32,
        error: String,
    },

    /// The processor accepted a charge but no receipt came back.
    ///
    /// The stock for `items` is still reserved.
    PaymentUnconfirmed {
        amount: Money,
        items: Vec<PricedLineItem>,
        error: String,
    },

    /// Money was captured but the order write was not confirmed.
    ///
    /// `order` is the exact document that was being written, so a replay
    /// can re-drive it idempotently.
    PersistenceAmbiguous {
        transaction_id: String,
        amount: Money,
        items: Vec<PricedLineItem>,
        order: Option<Order>,
        error: String,
    },

    /// The order exists but the user's cart still holds its lines.
    CartClearFailed { error: String },
}

impl ReconciliationKind {
    /// Returns the kind name, used as a metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationKind::StockDiscrepancy { .. } => "stock_discrepancy",
            ReconciliationKind::PaymentUnconfirmed { .. } => "payment_unconfirmed",
            ReconciliationKind::PersistenceAmbiguous { .. } => "persistence_ambiguous",
            ReconciliationKind::CartClearFailed { .. } => "cart_clear_failed",
        }
    }
}

/// One unresolved inconsistency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationRecord {
    pub id: Uuid,
    pub order_id: OrderId,
    pub user_id: UserId,
    #[serde(flatten)]
    pub kind: ReconciliationKind,
    pub journal: Vec<SagaEvent>,
    pub recorded_at: DateTime<Utc>,
}

impl ReconciliationRecord {
    pub fn new(
        order_id: OrderId,
        user_id: UserId,
        kind: ReconciliationKind,
        journal: Vec<SagaEvent>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            user_id,
            kind,
            journal,
            recorded_at: Utc::now(),
        }
    }
}

/// Sink for reconciliation records.
#[async_trait]
pub trait ReconciliationLog: Send + Sync {
    /// Stores a new record.
    async fn record(&self, record: ReconciliationRecord);

    /// Returns every unresolved record, oldest first.
    async fn pending(&self) -> Vec<ReconciliationRecord>;

    /// Marks a record as resolved. Returns false if it was not pending.
    async fn resolve(&self, id: Uuid) -> bool;
}

/// Process-local reconciliation log.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReconciliationLog {
    records: Arc<RwLock<Vec<ReconciliationRecord>>>,
}

impl InMemoryReconciliationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of unresolved records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ReconciliationLog for InMemoryReconciliationLog {
    async fn record(&self, record: ReconciliationRecord) {
        tracing::error!(
            record_id = %record.id,
            order_id = %record.order_id,
            user_id = %record.user_id,
            kind = record.kind.as_str(),
            details = ?record.kind,
            "reconciliation required"
        );
        metrics::counter!("saga_reconciliation_events_total", "kind" => record.kind.as_str())
            .increment(1);
        self.records.write().await.push(record);
    }

    async fn pending(&self) -> Vec<ReconciliationRecord> {
        self.records.read().await.clone()
    }

    async fn resolve(&self, id: Uuid) -> bool {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.id != id);
        records.len() != before
    }
}
