use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, ProductId, UserId};
use domain::{Money, Order};
use tokio::sync::RwLock;

use crate::{
    OrderStoreError, ProductSales, Result, RevenueSummary, TimeRange, store::OrderStore,
};

#[derive(Default)]
struct InMemoryState {
    orders: HashMap<OrderId, Order>,
    unavailable: bool,
    lose_write_acks: u32,
}

/// In-memory order store implementation for testing.
///
/// Provides the same interface as the PostgreSQL implementation, plus
/// failure injection for exercising the orchestrator's commit-point paths.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<InMemoryState>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Makes every operation fail with `Unavailable` until reset.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    /// The next `times` inserts are applied but reported as failed,
    /// simulating a write whose acknowledgement was lost.
    pub async fn lose_write_acks(&self, times: u32) {
        self.state.write().await.lose_write_acks = times;
    }

    /// Clears all orders.
    pub async fn clear(&self) {
        self.state.write().await.orders.clear();
    }

    fn check_available(state: &InMemoryState) -> Result<()> {
        if state.unavailable {
            return Err(OrderStoreError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let mut state = self.state.write().await;
        Self::check_available(&state)?;

        if state.orders.contains_key(&order.order_id()) {
            return Err(OrderStoreError::DuplicateOrder(order.order_id()));
        }
        state.orders.insert(order.order_id(), order.clone());

        if state.lose_write_acks > 0 {
            state.lose_write_acks -= 1;
            return Err(OrderStoreError::Unavailable(
                "write acknowledgement lost".to_string(),
            ));
        }
        Ok(())
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Self::check_available(&state)?;
        Ok(state.orders.get(&order_id).cloned())
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Self::check_available(&state)?;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| o.user_id() == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| a.order_id().cmp(&b.order_id()))
        });
        Ok(orders)
    }

    async fn list_between(&self, range: TimeRange) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Self::check_available(&state)?;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| range.contains(o.created_at()))
            .cloned()
            .collect();
        orders.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.order_id().cmp(&b.order_id()))
        });
        Ok(orders)
    }

    async fn has_purchased(&self, user_id: &UserId, product_id: &ProductId) -> Result<bool> {
        let state = self.state.read().await;
        Self::check_available(&state)?;
        Ok(state
            .orders
            .values()
            .any(|o| o.user_id() == user_id && o.contains_product(product_id)))
    }

    async fn revenue(&self, range: TimeRange) -> Result<RevenueSummary> {
        let state = self.state.read().await;
        Self::check_available(&state)?;
        state
            .orders
            .values()
            .filter(|o| range.contains(o.created_at()))
            .try_fold(RevenueSummary::default(), |acc, o| -> Result<RevenueSummary> {
                Ok(RevenueSummary {
                    order_count: acc.order_count + 1,
                    total_revenue: acc
                        .total_revenue
                        .checked_add(o.total_price())
                        .ok_or(OrderStoreError::Overflow("revenue"))?,
                })
            })
    }

    async fn top_products(&self, limit: usize) -> Result<Vec<ProductSales>> {
        let state = self.state.read().await;
        Self::check_available(&state)?;

        // (sales, created_at of the order the name was taken from)
        let mut by_product: BTreeMap<ProductId, (ProductSales, chrono::DateTime<chrono::Utc>)> =
            BTreeMap::new();
        for order in state.orders.values() {
            for item in order.items() {
                let line_total = item
                    .line_total()
                    .ok_or(OrderStoreError::Overflow("product revenue"))?;
                let entry = by_product.entry(item.product_id.clone()).or_insert_with(|| {
                    (
                        ProductSales {
                            product_id: item.product_id.clone(),
                            name: item.name.clone(),
                            units_sold: 0,
                            revenue: Money::zero(),
                        },
                        order.created_at(),
                    )
                });
                entry.0.units_sold += u64::from(item.quantity);
                entry.0.revenue = entry
                    .0
                    .revenue
                    .checked_add(line_total)
                    .ok_or(OrderStoreError::Overflow("product revenue"))?;
                if order.created_at() > entry.1 {
                    entry.0.name = item.name.clone();
                    entry.1 = order.created_at();
                }
            }
        }

        let mut sales: Vec<_> = by_product.into_values().map(|(s, _)| s).collect();
        sales.sort_by(|a, b| {
            b.units_sold
                .cmp(&a.units_sold)
                .then_with(|| a.product_id.cmp(&b.product_id))
        });
        sales.truncate(limit);
        Ok(sales)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use domain::{CartLine, CatalogEntry, OrderDraft, PricedLineItem};

    use super::*;
    use crate::store::{InsertOutcome, OrderStoreExt};

    fn line(product: &str, name: &str, quantity: u32, cents: i64) -> PricedLineItem {
        PricedLineItem::new(
            &CartLine::new(product, quantity),
            CatalogEntry {
                name: name.to_string(),
                unit_price: Money::from_cents(cents),
                owner_id: UserId::new("seller"),
            },
        )
    }

    fn order_at(user: &str, lines: Vec<PricedLineItem>, created_at: DateTime<Utc>) -> Order {
        let mut draft = OrderDraft::new(OrderId::new(), UserId::new(user));
        for l in lines {
            draft.push(l).unwrap();
        }
        draft.into_order("txn_test", created_at).unwrap()
    }

    #[tokio::test]
    async fn insert_and_get() {
        let store = InMemoryOrderStore::new();
        let order = order_at("u1", vec![line("P1", "Widget", 2, 1000)], Utc::now());

        store.insert(&order).await.unwrap();
        assert_eq!(store.get(order.order_id()).await.unwrap(), Some(order));
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn duplicate_insert_rejected() {
        let store = InMemoryOrderStore::new();
        let order = order_at("u1", vec![line("P1", "Widget", 1, 1000)], Utc::now());

        store.insert(&order).await.unwrap();
        let err = store.insert(&order).await.unwrap_err();
        assert!(matches!(err, OrderStoreError::DuplicateOrder(id) if id == order.order_id()));
    }

    #[tokio::test]
    async fn idempotent_insert_after_lost_ack() {
        let store = InMemoryOrderStore::new();
        let order = order_at("u1", vec![line("P1", "Widget", 1, 1000)], Utc::now());

        store.lose_write_acks(1).await;
        assert!(store.insert(&order).await.is_err());

        let outcome = store.insert_idempotent(&order).await.unwrap();
        assert_eq!(outcome, InsertOutcome::AlreadyPresent);
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn list_for_user_newest_first() {
        let store = InMemoryOrderStore::new();
        let now = Utc::now();
        let old = order_at("u1", vec![line("P1", "Widget", 1, 100)], now - Duration::hours(2));
        let new = order_at("u1", vec![line("P2", "Gadget", 1, 100)], now);
        let other = order_at("u2", vec![line("P1", "Widget", 1, 100)], now);
        for o in [&old, &new, &other] {
            store.insert(o).await.unwrap();
        }

        let listed = store.list_for_user(&UserId::new("u1")).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|o| o.order_id()).collect();
        assert_eq!(ids, vec![new.order_id(), old.order_id()]);
    }

    #[tokio::test]
    async fn has_purchased_scans_line_items() {
        let store = InMemoryOrderStore::new();
        let order = order_at(
            "u1",
            vec![line("P1", "Widget", 1, 100), line("P7", "Gizmo", 1, 100)],
            Utc::now(),
        );
        store.insert(&order).await.unwrap();

        let u1 = UserId::new("u1");
        assert!(store.has_purchased(&u1, &ProductId::new("P7")).await.unwrap());
        assert!(!store.has_purchased(&u1, &ProductId::new("P2")).await.unwrap());
        assert!(
            !store
                .has_purchased(&UserId::new("u2"), &ProductId::new("P1"))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn revenue_respects_window() {
        let store = InMemoryOrderStore::new();
        let now = Utc::now();
        store
            .insert(&order_at("u1", vec![line("P1", "W", 2, 1000)], now - Duration::days(2)))
            .await
            .unwrap();
        store
            .insert(&order_at("u1", vec![line("P1", "W", 1, 1000)], now))
            .await
            .unwrap();

        let all = store.revenue(TimeRange::all()).await.unwrap();
        assert_eq!(all.order_count, 2);
        assert_eq!(all.total_revenue, Money::from_cents(3000));

        let recent = store
            .revenue(TimeRange::all().from(now - Duration::hours(1)))
            .await
            .unwrap();
        assert_eq!(recent.order_count, 1);
        assert_eq!(recent.total_revenue, Money::from_cents(1000));
    }

    #[tokio::test]
    async fn report_totals_refuse_to_overflow() {
        let store = InMemoryOrderStore::new();
        let now = Utc::now();
        let huge = i64::MAX / 2 + 1;
        for _ in 0..2 {
            store
                .insert(&order_at("u1", vec![line("P1", "W", 1, huge)], now))
                .await
                .unwrap();
        }

        assert!(matches!(
            store.revenue(TimeRange::all()).await,
            Err(OrderStoreError::Overflow(_))
        ));
        assert!(matches!(
            store.top_products(10).await,
            Err(OrderStoreError::Overflow(_))
        ));
    }

    #[tokio::test]
    async fn top_products_by_units() {
        let store = InMemoryOrderStore::new();
        let now = Utc::now();
        store
            .insert(&order_at(
                "u1",
                vec![line("P1", "Widget", 2, 1000), line("P2", "Gadget", 5, 100)],
                now - Duration::hours(1),
            ))
            .await
            .unwrap();
        store
            .insert(&order_at("u2", vec![line("P1", "Widget v2", 1, 1200)], now))
            .await
            .unwrap();
        store
            .insert(&order_at("u3", vec![line("P3", "Thing", 3, 50)], now))
            .await
            .unwrap();

        let top = store.top_products(2).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].product_id.as_str(), "P2");
        assert_eq!(top[0].units_sold, 5);
        assert_eq!(top[1].product_id.as_str(), "P1");
        assert_eq!(top[1].units_sold, 3);
        assert_eq!(top[1].revenue, Money::from_cents(3200));
        assert_eq!(top[1].name, "Widget v2");
    }

    #[tokio::test]
    async fn unavailable_store_fails_reads_and_writes() {
        let store = InMemoryOrderStore::new();
        store.set_unavailable(true).await;
        let order = order_at("u1", vec![line("P1", "Widget", 1, 100)], Utc::now());

        assert!(matches!(
            store.insert(&order).await,
            Err(OrderStoreError::Unavailable(_))
        ));
        assert!(store.list_for_user(&UserId::new("u1")).await.is_err());
        assert_eq!(store.order_count().await, 0);
    }
}
