//! Saga orchestration for order creation.
//!
//! Turning a cart into an order touches four services that share no
//! transaction: cart, catalog, inventory and payment. The order creation
//! saga runs these steps:
//! 1. Fetch the cart
//! 2. Price every line from the catalog
//! 3. Reserve stock, line by line
//! 4. Capture payment (the commit point)
//! 5. Persist the order
//! 6. Clear the cart
//!
//! If a step before the commit point fails, stock reservations are undone
//! in reverse order. After it nothing is rolled back; unconfirmed effects
//! are written to the reconciliation log instead.

pub mod config;
pub mod error;
pub mod events;
pub mod gateways;
pub mod idempotency;
pub mod instance;
pub mod order_creation;
pub mod orchestrator;
pub mod reconciliation;
pub mod retry;
pub mod state;

pub use config::OrchestratorConfig;
pub use error::{GatewayError, SagaError, Service};
pub use events::SagaEvent;
pub use gateways::{
    CartGateway, CatalogGateway, HttpCartGateway, HttpCatalogGateway, HttpInventoryGateway,
    HttpPaymentGateway, InMemoryCartService, InMemoryCatalogService, InMemoryInventoryService,
    InMemoryPaymentService, InventoryGateway, PaymentGateway, PaymentReceipt,
};
pub use idempotency::IdempotencyCache;
pub use instance::{Reservation, SagaInstance};
pub use orchestrator::{Gateways, OrderOrchestrator, OrderReceipt, ReplaySummary};
pub use reconciliation::{
    InMemoryReconciliationLog, ReconciliationKind, ReconciliationLog, ReconciliationRecord,
};
pub use retry::RetryPolicy;
pub use state::SagaState;
