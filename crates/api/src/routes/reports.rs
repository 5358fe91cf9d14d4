//! Revenue and best-seller reports read from the order store.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use chrono::{DateTime, Utc};
use order_store::TimeRange;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

const DEFAULT_TOP_PRODUCTS: usize = 10;
const MAX_TOP_PRODUCTS: usize = 100;

#[derive(Deserialize)]
pub struct RevenueQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Deserialize)]
pub struct TopProductsQuery {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct RevenueResponse {
    pub from: Option<String>,
    pub to: Option<String>,
    pub order_count: u64,
    pub total_revenue_cents: i64,
}

#[derive(Serialize)]
pub struct ProductSalesResponse {
    pub product_id: String,
    pub name: String,
    pub units_sold: u64,
    pub revenue_cents: i64,
}

/// GET /reports/revenue?from=&to=: order count and revenue in a window.
///
/// Both bounds are RFC 3339 and optional; `from` is inclusive, `to` exclusive.
#[tracing::instrument(skip(state, query))]
pub async fn revenue(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RevenueQuery>,
) -> Result<Json<RevenueResponse>, ApiError> {
    let range = TimeRange {
        from: parse_bound("from", query.from.as_deref())?,
        to: parse_bound("to", query.to.as_deref())?,
    };
    if let (Some(from), Some(to)) = (range.from, range.to)
        && from > to
    {
        return Err(ApiError::BadRequest("from must not be after to".to_string()));
    }

    let summary = state.store().revenue(range).await?;
    Ok(Json(RevenueResponse {
        from: range.from.map(|t| t.to_rfc3339()),
        to: range.to.map(|t| t.to_rfc3339()),
        order_count: summary.order_count,
        total_revenue_cents: summary.total_revenue.cents(),
    }))
}

/// GET /reports/top-products?limit=: best sellers by units sold.
#[tracing::instrument(skip(state, query))]
pub async fn top_products(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TopProductsQuery>,
) -> Result<Json<Vec<ProductSalesResponse>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_TOP_PRODUCTS)
        .min(MAX_TOP_PRODUCTS);

    let sales = state.store().top_products(limit).await?;
    Ok(Json(
        sales
            .into_iter()
            .map(|s| ProductSalesResponse {
                product_id: s.product_id.to_string(),
                name: s.name,
                units_sold: s.units_sold,
                revenue_cents: s.revenue.cents(),
            })
            .collect(),
    ))
}

fn parse_bound(name: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(|v| {
            DateTime::parse_from_rfc3339(v.trim())
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| ApiError::BadRequest(format!("Invalid {name} timestamp: {e}")))
        })
        .transpose()
}
