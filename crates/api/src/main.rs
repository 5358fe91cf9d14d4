//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::local::LocalServices;
use order_store::{InMemoryOrderStore, OrderStore, PostgresOrderStore};
use saga::{
    Gateways, HttpCartGateway, HttpCatalogGateway, HttpInventoryGateway, HttpPaymentGateway,
    OrchestratorConfig,
};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn open_store(config: &Config) -> Result<Arc<dyn OrderStore>, BoxError> {
    match &config.database_url {
        Some(url) => {
            let store = PostgresOrderStore::connect(url).await?;
            store.run_migrations().await?;
            tracing::info!("using postgres order store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, orders are kept in memory");
            Ok(Arc::new(InMemoryOrderStore::new()))
        }
    }
}

fn build_gateways(config: &Config) -> Result<Gateways, BoxError> {
    let Some(urls) = config.service_urls() else {
        if config.has_partial_service_urls() {
            tracing::warn!("only some service URLs are set, ignoring all of them");
        }
        tracing::warn!("using seeded in-memory services");
        return Ok(LocalServices::seeded().gateways());
    };

    let client = reqwest::Client::builder().build()?;
    tracing::info!(
        cart = %urls.cart,
        product = %urls.product,
        inventory = %urls.inventory,
        payment = %urls.payment,
        "using remote services"
    );
    Ok(Gateways {
        cart: Arc::new(HttpCartGateway::new(client.clone(), urls.cart)),
        catalog: Arc::new(HttpCatalogGateway::new(client.clone(), urls.product)),
        inventory: Arc::new(HttpInventoryGateway::new(client.clone(), urls.inventory)),
        payment: Arc::new(HttpPaymentGateway::new(client, urls.payment)),
    })
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = Config::from_env();

    // 1. Initialize tracing
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("failed to install Prometheus recorder: {e}"))?;

    // 3. Wire the order store, downstream services and orchestrator
    let store = open_store(&config).await?;
    let gateways = build_gateways(&config)?;
    let orchestrator_config = OrchestratorConfig::from_env();
    tracing::debug!(?orchestrator_config, "orchestrator configured");
    let state = api::create_state(orchestrator_config, gateways, store);

    // 4. Build the application
    let app = api::create_app(state, metrics_handle);

    // 5. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down gracefully");
    Ok(())
}
