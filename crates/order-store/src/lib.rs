//! Durable storage for completed orders.
//!
//! The order orchestrator writes each order exactly once at its commit
//! point; everything else here is read-side: per-user history, time-range
//! scans, the purchase check used for review eligibility, and the aggregate
//! queries consumed by reporting.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{OrderStoreError, Result};
pub use memory::InMemoryOrderStore;
pub use postgres::PostgresOrderStore;
pub use query::{ProductSales, RevenueSummary, TimeRange};
pub use store::{InsertOutcome, OrderStore, OrderStoreExt};
