use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, UserId};
use domain::{Money, Order, OrderStatus, PricedLineItem};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    OrderStoreError, ProductSales, Result, RevenueSummary, TimeRange, store::OrderStore,
};

const ORDER_COLUMNS: &str =
    "order_id, user_id, items, total_cents, transaction_id, status, created_at";

/// PostgreSQL-backed order store implementation.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let order_id = OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?);
        let corrupt = |reason: String| OrderStoreError::Corrupt { order_id, reason };

        let items: Vec<PricedLineItem> =
            serde_json::from_value(row.try_get::<serde_json::Value, _>("items")?)?;
        let status: OrderStatus = row
            .try_get::<String, _>("status")?
            .parse()
            .map_err(corrupt)?;

        Order::new(
            order_id,
            UserId::new(row.try_get::<String, _>("user_id")?),
            items,
            Money::from_cents(row.try_get("total_cents")?),
            row.try_get("transaction_id")?,
            status,
            row.try_get::<DateTime<Utc>, _>("created_at")?,
        )
        .map_err(|e| corrupt(e.to_string()))
    }

    fn to_u64(column: &str, value: i64) -> Result<u64> {
        u64::try_from(value).map_err(|_| {
            OrderStoreError::Database(sqlx::Error::Decode(
                format!("negative aggregate in {column}: {value}").into(),
            ))
        })
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let items = serde_json::to_value(order.items())?;

        sqlx::query(
            r#"
            INSERT INTO orders (order_id, user_id, items, total_cents, transaction_id, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(order.order_id().as_uuid())
        .bind(order.user_id().as_str())
        .bind(items)
        .bind(order.total_price().cents())
        .bind(order.transaction_id())
        .bind(order.status().as_str())
        .bind(order.created_at())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("orders_pkey")
            {
                return OrderStoreError::DuplicateOrder(order.order_id());
            }
            OrderStoreError::Database(e)
        })?;

        tracing::debug!(order_id = %order.order_id(), "order row inserted");
        Ok(())
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = $1"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 \
             ORDER BY created_at DESC, order_id ASC"
        ))
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn list_between(&self, range: TimeRange) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE ($1::TIMESTAMPTZ IS NULL OR created_at >= $1) \
               AND ($2::TIMESTAMPTZ IS NULL OR created_at < $2) \
             ORDER BY created_at ASC, order_id ASC"
        ))
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn has_purchased(&self, user_id: &UserId, product_id: &ProductId) -> Result<bool> {
        let purchased: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM orders
                WHERE user_id = $1
                  AND items @> jsonb_build_array(jsonb_build_object('product_id', $2::TEXT))
            )
            "#,
        )
        .bind(user_id.as_str())
        .bind(product_id.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(purchased)
    }

    async fn revenue(&self, range: TimeRange) -> Result<RevenueSummary> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS order_count,
                   COALESCE(SUM(total_cents), 0)::BIGINT AS total_cents
            FROM orders
            WHERE ($1::TIMESTAMPTZ IS NULL OR created_at >= $1)
              AND ($2::TIMESTAMPTZ IS NULL OR created_at < $2)
            "#,
        )
        .bind(range.from)
        .bind(range.to)
        .fetch_one(&self.pool)
        .await?;

        Ok(RevenueSummary {
            order_count: Self::to_u64("order_count", row.try_get("order_count")?)?,
            total_revenue: Money::from_cents(row.try_get("total_cents")?),
        })
    }

    async fn top_products(&self, limit: usize) -> Result<Vec<ProductSales>> {
        let rows = sqlx::query(
            r#"
            SELECT item->>'product_id' AS product_id,
                   (array_agg(item->>'name' ORDER BY o.created_at DESC))[1] AS name,
                   SUM((item->>'quantity')::BIGINT)::BIGINT AS units_sold,
                   SUM((item->>'quantity')::BIGINT * (item->'unit_price'->>'cents')::BIGINT)::BIGINT
                       AS revenue_cents
            FROM orders o, jsonb_array_elements(o.items) AS item
            GROUP BY item->>'product_id'
            ORDER BY units_sold DESC, product_id ASC
            LIMIT $1
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(ProductSales {
                    product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
                    name: row.try_get("name")?,
                    units_sold: Self::to_u64("units_sold", row.try_get("units_sold")?)?,
                    revenue: Money::from_cents(row.try_get("revenue_cents")?),
                })
            })
            .collect()
    }
}
