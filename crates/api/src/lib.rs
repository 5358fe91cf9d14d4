//! HTTP API server for the order services.
//!
//! Provides REST endpoints for order creation, order history, purchase
//! checks, revenue reporting and reconciliation, with structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod local;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::{InMemoryOrderStore, OrderStore};
use saga::{Gateways, InMemoryReconciliationLog, OrchestratorConfig, OrderOrchestrator};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use local::LocalServices;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub orchestrator: OrderOrchestrator,
}

impl AppState {
    /// The order store behind the orchestrator; serves all read routes.
    pub fn store(&self) -> &Arc<dyn OrderStore> {
        self.orchestrator.store()
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders/create/{user_id}", post(routes::orders::create))
        .route("/orders/check-purchase", post(routes::orders::check_purchase))
        .route("/orders/{user_id}", get(routes::orders::list))
        .route("/reports/revenue", get(routes::reports::revenue))
        .route("/reports/top-products", get(routes::reports::top_products))
        .route("/admin/reconciliation", get(routes::admin::pending))
        .route("/admin/reconciliation/replay", post(routes::admin::replay))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Builds application state around an orchestrator.
pub fn create_state(
    config: OrchestratorConfig,
    gateways: Gateways,
    store: Arc<dyn OrderStore>,
) -> Arc<AppState> {
    let orchestrator = OrderOrchestrator::new(
        config,
        gateways,
        store,
        Arc::new(InMemoryReconciliationLog::new()),
    );
    Arc::new(AppState { orchestrator })
}

/// Creates the default application state: in-memory store and seeded
/// in-memory services.
pub fn create_default_state() -> (Arc<AppState>, LocalServices) {
    let services = LocalServices::seeded();
    let state = create_state(
        OrchestratorConfig::default(),
        services.gateways(),
        Arc::new(InMemoryOrderStore::new()),
    );
    (state, services)
}
