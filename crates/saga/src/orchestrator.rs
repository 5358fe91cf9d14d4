//! Order orchestrator: drives one order-creation saga per request.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{OrderId, ProductId, UserId};
use domain::{CartLine, CartSnapshot, CatalogEntry, Money, Order, OrderStatus, PricedLineItem};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, join_all};
use order_store::{InsertOutcome, OrderStore, OrderStoreExt};
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::Instrument;

use crate::config::OrchestratorConfig;
use crate::error::{GatewayError, Result, SagaError, Service};
use crate::events::SagaEvent;
use crate::gateways::{CartGateway, CatalogGateway, InventoryGateway, PaymentGateway};
use crate::idempotency::IdempotencyCache;
use crate::instance::SagaInstance;
use crate::order_creation;
use crate::reconciliation::{ReconciliationKind, ReconciliationLog, ReconciliationRecord};
use crate::state::SagaState;

/// How long an idempotency key stays bound to its outcome.
const IDEMPOTENCY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// The downstream services a saga talks to.
#[derive(Clone)]
pub struct Gateways {
    pub cart: Arc<dyn CartGateway>,
    pub catalog: Arc<dyn CatalogGateway>,
    pub inventory: Arc<dyn InventoryGateway>,
    pub payment: Arc<dyn PaymentGateway>,
}

/// What a successful order creation returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderReceipt {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub total_price: Money,
    pub transaction_id: String,
}

/// Result of re-driving ambiguous order writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    /// Orders written by this replay.
    pub inserted: Vec<OrderId>,
    /// Orders that turned out to have been written the first time.
    pub already_present: Vec<OrderId>,
    /// Records that still could not be resolved.
    pub still_pending: usize,
}

#[derive(Debug, Error)]
enum CallError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("saga deadline exceeded")]
    Deadline,
}

impl CallError {
    fn into_saga(self, map: impl FnOnce(GatewayError) -> SagaError) -> SagaError {
        match self {
            CallError::Gateway(e) => map(e),
            CallError::Deadline => SagaError::OrderTimedOut,
        }
    }
}

fn upstream(service: Service) -> impl FnOnce(GatewayError) -> SagaError {
    move |e| SagaError::UpstreamUnavailable {
        service,
        reason: e.to_string(),
    }
}

/// Runs `fut` under the per-call `limit`, cut short by `deadline` if one applies.
async fn bounded<T>(
    service: Service,
    limit: Duration,
    deadline: Option<Instant>,
    fut: impl Future<Output = std::result::Result<T, GatewayError>>,
) -> std::result::Result<T, CallError> {
    let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
    let (budget, deadline_bound) = match remaining {
        Some(remaining) if remaining < limit => (remaining, true),
        _ => (limit, false),
    };

    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result.map_err(CallError::Gateway),
        Err(_) if deadline_bound => Err(CallError::Deadline),
        Err(_) => {
            tracing::warn!(%service, ?limit, "downstream call timed out");
            Err(CallError::Gateway(GatewayError::Unavailable(format!(
                "timed out after {limit:?}"
            ))))
        }
    }
}

struct Inner {
    config: OrchestratorConfig,
    gateways: Gateways,
    store: Arc<dyn OrderStore>,
    reconciliation: Arc<dyn ReconciliationLog>,
    idempotency: IdempotencyCache<OrderReceipt>,
}

/// Creates orders from carts.
///
/// Each call runs its own saga on a spawned task: fetch the cart, price it
/// from the catalog, reserve stock, charge, persist, clear the cart. Before
/// the charge succeeds every failure is compensated in reverse order; after
/// it nothing is rolled back and anything unconfirmed goes to the
/// reconciliation log. Cheap to clone.
#[derive(Clone)]
pub struct OrderOrchestrator {
    inner: Arc<Inner>,
}

impl OrderOrchestrator {
    /// Creates a new orchestrator.
    pub fn new(
        config: OrchestratorConfig,
        gateways: Gateways,
        store: Arc<dyn OrderStore>,
        reconciliation: Arc<dyn ReconciliationLog>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                gateways,
                store,
                reconciliation,
                idempotency: IdempotencyCache::new(IDEMPOTENCY_TTL),
            }),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    /// The store orders are written to; also serves the read side.
    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.inner.store
    }

    pub fn reconciliation(&self) -> &Arc<dyn ReconciliationLog> {
        &self.inner.reconciliation
    }

    /// Creates an order from the user's current cart.
    ///
    /// The saga keeps running to a terminal state even if the returned
    /// future is dropped.
    #[tracing::instrument(skip(self), fields(saga_type = order_creation::SAGA_TYPE))]
    pub async fn create_order(&self, user_id: UserId) -> Result<OrderReceipt> {
        self.spawn_saga(user_id).await
    }

    /// Like [`create_order`](Self::create_order), but at most one saga runs
    /// per `(user_id, key)`; repeats get the first outcome.
    #[tracing::instrument(skip(self), fields(saga_type = order_creation::SAGA_TYPE))]
    pub async fn create_order_idempotent(
        &self,
        user_id: UserId,
        key: &str,
    ) -> Result<OrderReceipt> {
        self.inner
            .idempotency
            .run(&user_id, key, || self.spawn_saga(user_id.clone()))
            .await
    }

    fn spawn_saga(&self, user_id: UserId) -> BoxFuture<'static, Result<OrderReceipt>> {
        let this = self.clone();
        let handle = tokio::spawn(async move { this.run(user_id).await }.in_current_span());
        async move {
            handle
                .await
                .unwrap_or_else(|e| Err(SagaError::Internal(format!("saga task failed: {e}"))))
        }
        .boxed()
    }

    async fn run(&self, user_id: UserId) -> Result<OrderReceipt> {
        metrics::counter!("saga_executions_total").increment(1);
        let saga_start = std::time::Instant::now();

        let mut saga = SagaInstance::new(OrderId::new(), user_id);
        tracing::info!(
            order_id = %saga.order_id(),
            user_id = %saga.user_id(),
            "saga started"
        );

        let result = self.execute(&mut saga).await;

        let duration = saga_start.elapsed().as_secs_f64();
        metrics::histogram!("saga_duration_seconds").record(duration);
        match &result {
            Ok(receipt) => {
                metrics::counter!("saga_completed").increment(1);
                tracing::info!(
                    order_id = %receipt.order_id,
                    total = %receipt.total_price,
                    duration,
                    "saga completed successfully"
                );
            }
            Err(e) => {
                metrics::counter!("saga_failed", "reason" => e.kind()).increment(1);
                if e.is_retry_safe() {
                    tracing::warn!(order_id = %saga.order_id(), error = %e, duration, "saga failed");
                } else {
                    tracing::error!(
                        order_id = %saga.order_id(),
                        error = %e,
                        duration,
                        "saga failed with unknown outcome"
                    );
                }
            }
        }
        result
    }

    async fn execute(&self, saga: &mut SagaInstance) -> Result<OrderReceipt> {
        let deadline = Instant::now() + self.inner.config.saga_deadline;
        match self.reserve_and_charge(saga, deadline).await {
            Ok(transaction_id) => self.commit(saga, transaction_id).await,
            Err(err @ SagaError::PaymentUnconfirmed { .. }) => {
                self.payment_unconfirmed(saga, &err).await;
                Err(err)
            }
            Err(err) => {
                self.abort(saga, &err).await;
                Err(err)
            }
        }
    }

    /// Everything before the commit point. Returns the transaction id.
    async fn reserve_and_charge(
        &self,
        saga: &mut SagaInstance,
        deadline: Instant,
    ) -> Result<String> {
        let config = &self.inner.config;
        let gateways = &self.inner.gateways;

        tracing::debug!(step = order_creation::STEP_FETCH_CART, "saga step started");
        let cart = bounded(
            Service::Cart,
            config.cart_timeout,
            Some(deadline),
            gateways.cart.fetch(saga.user_id()),
        )
        .await
        .map_err(|e| e.into_saga(upstream(Service::Cart)))?;
        Self::validate_cart(&cart)?;
        saga.transition(SagaState::CartFetched)?;

        tracing::debug!(step = order_creation::STEP_PRICE_ITEMS, "saga step started");
        self.price_items(saga, &cart, deadline).await?;
        saga.transition(SagaState::Priced)?;

        tracing::debug!(step = order_creation::STEP_RESERVE_STOCK, "saga step started");
        self.reserve_stock(saga, deadline).await?;
        saga.transition(SagaState::StockReserved)?;

        tracing::debug!(step = order_creation::STEP_CAPTURE_PAYMENT, "saga step started");
        let order_id = saga.order_id();
        let receipt = bounded(
            Service::Payment,
            config.payment_timeout,
            Some(deadline),
            gateways
                .payment
                .charge(saga.order_id(), saga.user_id(), saga.total()),
        )
        .await
        .map_err(|e| {
            e.into_saga(|g| match g {
                GatewayError::Declined(reason) => SagaError::PaymentDeclined { reason },
                GatewayError::Ambiguous(reason) => {
                    SagaError::PaymentUnconfirmed { order_id, reason }
                }
                other => upstream(Service::Payment)(other),
            })
        })?;

        Ok(receipt.transaction_id)
    }

    fn validate_cart(cart: &CartSnapshot) -> Result<()> {
        if cart.is_empty() {
            return Err(SagaError::EmptyCart);
        }
        if let Some(line) = cart.lines().iter().find(|l| l.quantity == 0) {
            return Err(SagaError::InvalidCart(format!(
                "zero quantity for product {}",
                line.product_id
            )));
        }
        Ok(())
    }

    async fn resolve(&self, line: &CartLine, deadline: Instant) -> Result<CatalogEntry> {
        bounded(
            Service::Catalog,
            self.inner.config.catalog_timeout,
            Some(deadline),
            self.inner.gateways.catalog.resolve(&line.product_id),
        )
        .await
        .map_err(|e| {
            e.into_saga(|g| match g {
                GatewayError::NotFound => SagaError::ProductUnavailable {
                    product_id: line.product_id.clone(),
                },
                other => upstream(Service::Catalog)(other),
            })
        })
    }

    async fn price_items(
        &self,
        saga: &mut SagaInstance,
        cart: &CartSnapshot,
        deadline: Instant,
    ) -> Result<()> {
        let entries = if self.inner.config.parallel_item_steps {
            join_all(cart.lines().iter().map(|line| self.resolve(line, deadline))).await
        } else {
            let mut entries = Vec::with_capacity(cart.len());
            for line in cart.lines() {
                let entry = self.resolve(line, deadline).await;
                let failed = entry.is_err();
                entries.push(entry);
                if failed {
                    break;
                }
            }
            entries
        };

        // Sum in cart order so the total never depends on completion order.
        for (line, entry) in cart.lines().iter().zip(entries) {
            saga.add_item(PricedLineItem::new(line, entry?))?;
        }
        Ok(())
    }

    async fn decrement(
        &self,
        product_id: &ProductId,
        quantity: u32,
        deadline: Instant,
    ) -> Result<()> {
        bounded(
            Service::Inventory,
            self.inner.config.inventory_timeout,
            Some(deadline),
            self.inner.gateways.inventory.decrement(product_id, quantity),
        )
        .await
        .map_err(|e| {
            e.into_saga(|g| match g {
                GatewayError::InsufficientStock | GatewayError::NotFound => {
                    SagaError::InsufficientStock {
                        product_id: product_id.clone(),
                    }
                }
                other => upstream(Service::Inventory)(other),
            })
        })
    }

    async fn reserve_stock(&self, saga: &mut SagaInstance, deadline: Instant) -> Result<()> {
        let lines: Vec<_> = saga
            .draft()
            .items()
            .iter()
            .map(|item| (item.product_id.clone(), item.quantity))
            .collect();

        if self.inner.config.parallel_item_steps {
            let results = join_all(
                lines
                    .iter()
                    .map(|(product_id, quantity)| self.decrement(product_id, *quantity, deadline)),
            )
            .await;

            let mut first_failure = None;
            for ((product_id, quantity), result) in lines.into_iter().zip(results) {
                match result {
                    Ok(()) => saga.record_reservation(product_id, quantity),
                    Err(e) => {
                        first_failure.get_or_insert(e);
                    }
                }
            }
            first_failure.map_or(Ok(()), Err)
        } else {
            for (product_id, quantity) in lines {
                self.decrement(&product_id, quantity, deadline).await?;
                saga.record_reservation(product_id, quantity);
            }
            Ok(())
        }
    }

    /// Undoes reservations in reverse, then marks the saga failed.
    async fn abort(&self, saga: &mut SagaInstance, err: &SagaError) {
        if !saga.reservations().is_empty() {
            if let Err(e) = saga.transition(SagaState::Compensating) {
                tracing::error!(order_id = %saga.order_id(), error = %e, "cannot enter compensation");
            }
            self.compensate(saga).await;
        }
        if let Err(e) = saga.fail(err) {
            tracing::error!(order_id = %saga.order_id(), error = %e, "cannot mark saga failed");
        }
    }

    #[tracing::instrument(skip(self, saga), fields(order_id = %saga.order_id()))]
    async fn compensate(&self, saga: &mut SagaInstance) {
        let config = &self.inner.config;
        let inventory = &self.inner.gateways.inventory;

        for reservation in saga.take_reservations_for_compensation() {
            metrics::counter!("saga_compensations_total").increment(1);
            let result = config
                .compensation_retry
                .run(|_attempt| {
                    bounded(
                        Service::Inventory,
                        config.inventory_timeout,
                        None,
                        inventory.increment(&reservation.product_id, reservation.quantity),
                    )
                })
                .await;

            match result {
                Ok(()) => {
                    saga.record_restored(&reservation);
                    tracing::info!(
                        step = order_creation::STEP_RESTORE_STOCK,
                        product_id = %reservation.product_id,
                        quantity = reservation.quantity,
                        "stock restored"
                    );
                }
                Err(e) => {
                    metrics::counter!("saga_compensation_failures_total").increment(1);
                    let error = e.to_string();
                    saga.record_compensation_failure(&reservation, &error);
                    self.inner
                        .reconciliation
                        .record(ReconciliationRecord::new(
                            saga.order_id(),
                            saga.user_id().clone(),
                            ReconciliationKind::StockDiscrepancy {
                                product_id: reservation.product_id.clone(),
                                quantity: reservation.quantity,
                                error,
                            },
                            saga.journal().to_vec(),
                        ))
                        .await;
                }
            }
        }
    }

    /// Everything after the commit point. Never compensates.
    async fn commit(&self, saga: &mut SagaInstance, transaction_id: String) -> Result<OrderReceipt> {
        saga.record_payment(transaction_id.clone());

        let order = match saga.transition(SagaState::PaymentCaptured).and_then(|()| {
            saga.draft()
                .clone()
                .into_order(&transaction_id, Utc::now())
                .map_err(|e| SagaError::Internal(e.to_string()))
        }) {
            Ok(order) => order,
            Err(e) => {
                return Err(self
                    .persistence_ambiguous(saga, &transaction_id, None, e.to_string())
                    .await);
            }
        };

        tracing::debug!(step = order_creation::STEP_PERSIST_ORDER, "saga step started");
        let store = &self.inner.store;
        let written = bounded(
            Service::OrderStore,
            self.inner.config.store_timeout,
            None,
            async {
                store
                    .insert(&order)
                    .await
                    .map_err(|e| GatewayError::Unavailable(e.to_string()))
            },
        )
        .await;
        if let Err(e) = written {
            return Err(self
                .persistence_ambiguous(saga, &transaction_id, Some(order), e.to_string())
                .await);
        }
        metrics::counter!("orders_persisted_total").increment(1);
        self.advance(saga, SagaState::Persisted);

        tracing::debug!(step = order_creation::STEP_CLEAR_CART, "saga step started");
        self.clear_cart(saga).await;
        self.advance(saga, SagaState::Completed);

        Ok(OrderReceipt {
            order_id: order.order_id(),
            status: order.status(),
            total_price: order.total_price(),
            transaction_id,
        })
    }

    // Past the commit point a bad transition is a bug to log, not a reason
    // to report failure for an order that exists.
    fn advance(&self, saga: &mut SagaInstance, next: SagaState) {
        if let Err(e) = saga.transition(next) {
            tracing::error!(order_id = %saga.order_id(), error = %e, "saga transition rejected");
        }
    }

    /// A charge may have gone through without a receipt. Stock stays
    /// reserved; an operator settles it from the reconciliation record.
    async fn payment_unconfirmed(&self, saga: &mut SagaInstance, err: &SagaError) {
        metrics::counter!("saga_payment_unconfirmed_total").increment(1);
        if let Err(e) = saga.fail(err) {
            tracing::error!(order_id = %saga.order_id(), error = %e, "cannot mark saga failed");
        }
        tracing::error!(
            order_id = %saga.order_id(),
            amount = %saga.total(),
            error = %err,
            "charge outcome unknown, holding reservations for reconciliation"
        );
        self.inner
            .reconciliation
            .record(ReconciliationRecord::new(
                saga.order_id(),
                saga.user_id().clone(),
                ReconciliationKind::PaymentUnconfirmed {
                    amount: saga.total(),
                    items: saga.draft().items().to_vec(),
                    error: err.to_string(),
                },
                saga.journal().to_vec(),
            ))
            .await;
    }

    async fn persistence_ambiguous(
        &self,
        saga: &mut SagaInstance,
        transaction_id: &str,
        order: Option<Order>,
        error: String,
    ) -> SagaError {
        let err = SagaError::PersistenceAmbiguous {
            order_id: saga.order_id(),
            transaction_id: transaction_id.to_string(),
        };
        if let Err(e) = saga.fail(&err) {
            tracing::error!(order_id = %saga.order_id(), error = %e, "cannot mark saga failed");
        }
        self.inner
            .reconciliation
            .record(ReconciliationRecord::new(
                saga.order_id(),
                saga.user_id().clone(),
                ReconciliationKind::PersistenceAmbiguous {
                    transaction_id: transaction_id.to_string(),
                    amount: saga.total(),
                    items: saga.draft().items().to_vec(),
                    order,
                    error,
                },
                saga.journal().to_vec(),
            ))
            .await;
        err
    }

    async fn clear_cart(&self, saga: &mut SagaInstance) {
        let user_id = saga.user_id().clone();
        let cleared = bounded(
            Service::Cart,
            self.inner.config.cart_timeout,
            None,
            self.inner.gateways.cart.clear(&user_id),
        )
        .await;

        if let Err(e) = cleared {
            let reason = e.to_string();
            tracing::warn!(
                order_id = %saga.order_id(),
                error = %reason,
                "cart clear failed, retrying in background"
            );
            saga.record_cart_clear_deferred(&reason);
            self.spawn_cart_clear_retry(saga.order_id(), user_id, saga.journal().to_vec());
        }
    }

    fn spawn_cart_clear_retry(&self, order_id: OrderId, user_id: UserId, journal: Vec<SagaEvent>) {
        let this = self.clone();
        let task = async move {
            let config = &this.inner.config;
            let cart = &this.inner.gateways.cart;
            tokio::time::sleep(config.cart_clear_retry.initial_backoff).await;

            let result = config
                .cart_clear_retry
                .run(|_attempt| {
                    metrics::counter!("cart_clear_retries_total").increment(1);
                    bounded(Service::Cart, config.cart_timeout, None, cart.clear(&user_id))
                })
                .await;

            match result {
                Ok(()) => tracing::info!(%order_id, "cart cleared on retry"),
                Err(e) => {
                    this.inner
                        .reconciliation
                        .record(ReconciliationRecord::new(
                            order_id,
                            user_id.clone(),
                            ReconciliationKind::CartClearFailed {
                                error: e.to_string(),
                            },
                            journal,
                        ))
                        .await;
                }
            }
        };
        tokio::spawn(task.in_current_span());
    }

    /// Re-drives every ambiguous order write in the reconciliation log.
    ///
    /// Writes are idempotent on the pre-assigned order id, so an order that
    /// did land the first time is detected rather than duplicated. Nobody
    /// is charged again.
    #[tracing::instrument(skip(self))]
    pub async fn replay_pending_orders(&self) -> ReplaySummary {
        let mut summary = ReplaySummary::default();

        for record in self.inner.reconciliation.pending().await {
            let ReconciliationKind::PersistenceAmbiguous {
                order: Some(order), ..
            } = &record.kind
            else {
                continue;
            };

            match self.inner.store.insert_idempotent(order).await {
                Ok(outcome) => {
                    self.inner.reconciliation.resolve(record.id).await;
                    match outcome {
                        InsertOutcome::Inserted => {
                            metrics::counter!("orders_persisted_total").increment(1);
                            summary.inserted.push(order.order_id());
                        }
                        InsertOutcome::AlreadyPresent => {
                            summary.already_present.push(order.order_id());
                        }
                    }
                    tracing::info!(order_id = %order.order_id(), ?outcome, "ambiguous order resolved");

                    let cleared = bounded(
                        Service::Cart,
                        self.inner.config.cart_timeout,
                        None,
                        self.inner.gateways.cart.clear(order.user_id()),
                    )
                    .await;
                    if cleared.is_err() {
                        self.spawn_cart_clear_retry(
                            order.order_id(),
                            order.user_id().clone(),
                            record.journal.clone(),
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(order_id = %order.order_id(), error = %e, "replay failed");
                    summary.still_pending += 1;
                }
            }
        }

        summary
    }
}
