//! Integration tests for the order creation saga.

use std::sync::Arc;
use std::time::Duration;

use common::{ProductId, UserId};
use domain::{CartLine, Money, OrderStatus};
use order_store::{InMemoryOrderStore, OrderStore};
use saga::{
    Gateways, InMemoryCartService, InMemoryCatalogService, InMemoryInventoryService,
    InMemoryPaymentService, InMemoryReconciliationLog, OrchestratorConfig, OrderOrchestrator,
    ReconciliationKind, ReconciliationLog, RetryPolicy, SagaError, Service,
};

struct TestHarness {
    orchestrator: OrderOrchestrator,
    cart: InMemoryCartService,
    catalog: InMemoryCatalogService,
    inventory: InMemoryInventoryService,
    payment: InMemoryPaymentService,
    store: InMemoryOrderStore,
    reconciliation: InMemoryReconciliationLog,
}

fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        compensation_retry: RetryPolicy::new(3, Duration::from_millis(1)),
        cart_clear_retry: RetryPolicy::new(3, Duration::from_millis(1)),
        ..OrchestratorConfig::default()
    }
}

impl TestHarness {
    fn new() -> Self {
        Self::with_config(fast_config())
    }

    fn with_config(config: OrchestratorConfig) -> Self {
        let cart = InMemoryCartService::new();
        let catalog = InMemoryCatalogService::new();
        let inventory = InMemoryInventoryService::new();
        let payment = InMemoryPaymentService::new();
        let store = InMemoryOrderStore::new();
        let reconciliation = InMemoryReconciliationLog::new();

        catalog.add_product("P1", "Widget", Money::from_cents(1000), "seller-1");
        catalog.add_product("P2", "Gadget", Money::from_cents(2500), "seller-2");
        catalog.add_product("P3", "Gizmo", Money::from_cents(199), "seller-1");
        inventory.set_stock("P1", 10);
        inventory.set_stock("P2", 10);
        inventory.set_stock("P3", 10);

        let orchestrator = OrderOrchestrator::new(
            config,
            Gateways {
                cart: Arc::new(cart.clone()),
                catalog: Arc::new(catalog.clone()),
                inventory: Arc::new(inventory.clone()),
                payment: Arc::new(payment.clone()),
            },
            Arc::new(store.clone()),
            Arc::new(reconciliation.clone()),
        );

        Self {
            orchestrator,
            cart,
            catalog,
            inventory,
            payment,
            store,
            reconciliation,
        }
    }

    fn fill_cart(&self, user: &str) {
        self.cart.set_cart(
            user,
            vec![CartLine::new("P1", 2), CartLine::new("P2", 1), CartLine::new("P3", 3)],
        );
    }

    fn stock(&self, product: &str) -> u32 {
        self.inventory.stock(&ProductId::new(product)).unwrap()
    }

    fn assert_stock_untouched(&self) {
        assert_eq!(self.stock("P1"), 10);
        assert_eq!(self.stock("P2"), 10);
        assert_eq!(self.stock("P3"), 10);
    }
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn test_happy_path_creates_order() {
    let h = TestHarness::new();
    h.fill_cart("u1");
    let user = UserId::new("u1");

    let receipt = h.orchestrator.create_order(user.clone()).await.unwrap();

    // 2 x 10.00 + 1 x 25.00 + 3 x 1.99
    assert_eq!(receipt.total_price, Money::from_cents(5097));
    assert_eq!(receipt.status, OrderStatus::Completed);

    let order = h.store.get(receipt.order_id).await.unwrap().unwrap();
    assert_eq!(order.user_id(), &user);
    assert_eq!(order.items().len(), 3);
    assert_eq!(order.items()[0].product_id.as_str(), "P1");
    assert_eq!(order.items()[0].owner_id.as_str(), "seller-1");
    assert_eq!(order.transaction_id(), receipt.transaction_id);

    assert_eq!(h.stock("P1"), 8);
    assert_eq!(h.stock("P2"), 9);
    assert_eq!(h.stock("P3"), 7);

    let charges = h.payment.charges();
    assert_eq!(charges.len(), 1);
    assert_eq!(charges[0].amount, receipt.total_price);
    assert_eq!(charges[0].order_id, receipt.order_id);

    assert!(h.cart.cart(&user).is_empty());
    assert!(h.reconciliation.is_empty().await);
}

#[tokio::test]
async fn test_empty_cart_has_no_side_effects() {
    let h = TestHarness::new();

    let err = h.orchestrator.create_order(UserId::new("u1")).await.unwrap_err();

    assert_eq!(err, SagaError::EmptyCart);
    assert_eq!(h.inventory.decrement_calls(), 0);
    assert_eq!(h.payment.charge_count(), 0);
    assert_eq!(h.store.order_count().await, 0);
}

#[tokio::test]
async fn test_zero_quantity_line_is_rejected() {
    let h = TestHarness::new();
    h.cart.set_cart("u1", vec![CartLine::new("P1", 1), CartLine::new("P2", 0)]);

    let err = h.orchestrator.create_order(UserId::new("u1")).await.unwrap_err();

    assert_eq!(err.kind(), "invalid_cart");
    assert_eq!(h.inventory.decrement_calls(), 0);
}

#[tokio::test]
async fn test_unknown_product_fails_before_reserving() {
    let h = TestHarness::new();
    h.cart.set_cart("u1", vec![CartLine::new("P1", 1), CartLine::new("GONE", 1)]);

    let err = h.orchestrator.create_order(UserId::new("u1")).await.unwrap_err();

    assert_eq!(
        err,
        SagaError::ProductUnavailable {
            product_id: ProductId::new("GONE")
        }
    );
    assert_eq!(h.inventory.decrement_calls(), 0);
    assert_eq!(h.payment.charge_count(), 0);
}

#[tokio::test]
async fn test_cart_service_down() {
    let h = TestHarness::new();
    h.fill_cart("u1");
    h.cart.set_unavailable(true);

    let err = h.orchestrator.create_order(UserId::new("u1")).await.unwrap_err();

    assert!(matches!(
        err,
        SagaError::UpstreamUnavailable {
            service: Service::Cart,
            ..
        }
    ));
    assert!(err.is_retry_safe());
}

#[tokio::test]
async fn test_insufficient_stock_restores_earlier_lines() {
    let h = TestHarness::new();
    h.fill_cart("u1");
    h.inventory.set_stock("P2", 0);

    let err = h.orchestrator.create_order(UserId::new("u1")).await.unwrap_err();

    assert_eq!(
        err,
        SagaError::InsufficientStock {
            product_id: ProductId::new("P2")
        }
    );
    assert_eq!(h.stock("P1"), 10);
    assert_eq!(h.stock("P2"), 0);
    assert_eq!(h.stock("P3"), 10);
    assert_eq!(h.payment.charge_count(), 0);
    assert_eq!(h.store.order_count().await, 0);
    assert_eq!(h.cart.cart(&UserId::new("u1")).len(), 3);
}

#[tokio::test]
async fn test_payment_declined_restores_all_stock() {
    let h = TestHarness::new();
    h.fill_cart("u1");
    h.payment
        .set_decline_reason(Some("insufficient_funds".to_string()));

    let err = h.orchestrator.create_order(UserId::new("u1")).await.unwrap_err();

    assert_eq!(
        err,
        SagaError::PaymentDeclined {
            reason: "insufficient_funds".to_string()
        }
    );
    assert!(err.is_retry_safe());
    h.assert_stock_untouched();
    assert_eq!(h.store.order_count().await, 0);
    assert_eq!(h.cart.cart(&UserId::new("u1")).len(), 3);
}

#[tokio::test]
async fn test_inventory_outage_mid_reservation_is_compensated() {
    let h = TestHarness::new();
    h.fill_cart("u1");
    h.inventory.set_unavailable_for(Some(ProductId::new("P3")));

    let err = h.orchestrator.create_order(UserId::new("u1")).await.unwrap_err();

    assert!(matches!(
        err,
        SagaError::UpstreamUnavailable {
            service: Service::Inventory,
            ..
        }
    ));
    h.assert_stock_untouched();
    assert_eq!(h.payment.charge_count(), 0);
}

#[tokio::test]
async fn test_compensation_retries_transient_failures() {
    let h = TestHarness::new();
    h.fill_cart("u1");
    h.payment.set_decline_reason(Some("card_declined".to_string()));
    // Fewer failures than retry attempts per line.
    h.inventory.fail_increment_times(2);

    h.orchestrator.create_order(UserId::new("u1")).await.unwrap_err();

    h.assert_stock_untouched();
    assert!(h.reconciliation.is_empty().await);
}

#[tokio::test]
async fn test_exhausted_compensation_is_recorded() {
    let h = TestHarness::new();
    h.cart.set_cart("u1", vec![CartLine::new("P1", 2)]);
    h.payment.set_decline_reason(Some("card_declined".to_string()));
    h.inventory.fail_increment_times(3);

    let err = h.orchestrator.create_order(UserId::new("u1")).await.unwrap_err();

    // The caller still sees the original failure.
    assert_eq!(err.kind(), "payment_declined");
    assert_eq!(h.stock("P1"), 8);

    let pending = h.reconciliation.pending().await;
    assert_eq!(pending.len(), 1);
    assert!(matches!(
        &pending[0].kind,
        ReconciliationKind::StockDiscrepancy { product_id, quantity: 2, .. }
            if product_id.as_str() == "P1"
    ));
    assert!(!pending[0].journal.is_empty());
}

#[tokio::test]
async fn test_lost_write_ack_is_ambiguous_then_replayed() {
    let h = TestHarness::new();
    h.fill_cart("u1");
    h.store.lose_write_acks(1).await;
    let user = UserId::new("u1");

    let err = h.orchestrator.create_order(user.clone()).await.unwrap_err();

    let SagaError::PersistenceAmbiguous {
        order_id,
        transaction_id,
    } = &err
    else {
        panic!("expected ambiguous outcome, got {err:?}");
    };
    assert!(!err.is_retry_safe());
    assert_eq!(h.payment.charges()[0].transaction_id, *transaction_id);
    // Stock stays reserved and the cart stays put after the commit point.
    assert_eq!(h.stock("P1"), 8);
    assert_eq!(h.cart.cart(&user).len(), 3);
    assert_eq!(h.reconciliation.len().await, 1);

    let summary = h.orchestrator.replay_pending_orders().await;

    assert_eq!(summary.already_present, vec![*order_id]);
    assert!(summary.inserted.is_empty());
    assert_eq!(h.store.order_count().await, 1);
    assert_eq!(h.payment.charge_count(), 1);
    assert!(h.reconciliation.is_empty().await);
    assert!(h.cart.cart(&user).is_empty());
}

#[tokio::test]
async fn test_store_outage_is_replayed_once_back() {
    let h = TestHarness::new();
    h.fill_cart("u1");
    h.store.set_unavailable(true).await;

    let err = h.orchestrator.create_order(UserId::new("u1")).await.unwrap_err();
    assert!(err.outcome_unknown());

    let summary = h.orchestrator.replay_pending_orders().await;
    assert_eq!(summary.still_pending, 1);

    h.store.set_unavailable(false).await;
    let summary = h.orchestrator.replay_pending_orders().await;
    assert_eq!(summary.inserted.len(), 1);

    let order = h.store.get(summary.inserted[0]).await.unwrap().unwrap();
    assert_eq!(order.total_price(), Money::from_cents(5097));
    assert_eq!(h.payment.charge_count(), 1);
}

#[tokio::test]
async fn test_cart_clear_failure_is_retried_in_background() {
    let h = TestHarness::new();
    h.fill_cart("u1");
    h.cart.fail_clear_times(2);
    let user = UserId::new("u1");

    let receipt = h.orchestrator.create_order(user.clone()).await.unwrap();

    assert!(h.store.get(receipt.order_id).await.unwrap().is_some());
    eventually(|| h.cart.cart(&user).is_empty()).await;
    assert!(h.reconciliation.is_empty().await);
}

#[tokio::test]
async fn test_cart_clear_exhaustion_is_recorded_not_failed() {
    let h = TestHarness::new();
    h.fill_cart("u1");
    // One inline attempt plus three background attempts.
    h.cart.fail_clear_times(4);

    let receipt = h.orchestrator.create_order(UserId::new("u1")).await.unwrap();
    assert_eq!(receipt.status, OrderStatus::Completed);

    eventually(|| h.cart.clear_calls() >= 4).await;
    for _ in 0..200 {
        if !h.reconciliation.is_empty().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let pending = h.reconciliation.pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].order_id, receipt.order_id);
    assert!(matches!(
        pending[0].kind,
        ReconciliationKind::CartClearFailed { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_slow_inventory_times_out_and_compensates() {
    let h = TestHarness::with_config(OrchestratorConfig {
        inventory_timeout: Duration::from_millis(100),
        ..fast_config()
    });
    h.cart.set_cart("u1", vec![CartLine::new("P1", 1)]);
    h.inventory.set_latency(Some(Duration::from_secs(1)));

    let err = h.orchestrator.create_order(UserId::new("u1")).await.unwrap_err();

    assert!(matches!(
        err,
        SagaError::UpstreamUnavailable {
            service: Service::Inventory,
            ..
        }
    ));
    assert_eq!(h.payment.charge_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_saga_deadline_bounds_pre_commit_steps() {
    let h = TestHarness::with_config(OrchestratorConfig {
        saga_deadline: Duration::from_millis(500),
        ..fast_config()
    });
    h.fill_cart("u1");
    // Each lookup is within its own timeout, but three of them are not.
    h.catalog.set_latency(Some(Duration::from_millis(200)));

    let err = h.orchestrator.create_order(UserId::new("u1")).await.unwrap_err();

    assert_eq!(err, SagaError::OrderTimedOut);
    assert!(err.is_retry_safe());
    h.assert_stock_untouched();
    assert_eq!(h.payment.charge_count(), 0);
}

#[tokio::test]
async fn test_concurrent_orders_never_oversell() {
    let h = Arc::new(TestHarness::new());
    h.inventory.set_stock("P1", 1);
    for i in 0..8 {
        h.cart.set_cart(format!("u{i}"), vec![CartLine::new("P1", 1)]);
    }

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let orchestrator = h.orchestrator.clone();
            tokio::spawn(async move { orchestrator.create_order(UserId::new(format!("u{i}"))).await })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(e) => assert_eq!(e.kind(), "insufficient_stock"),
        }
    }
    assert_eq!(succeeded, 1);
    assert_eq!(h.stock("P1"), 0);
    assert_eq!(h.store.order_count().await, 1);
}

#[tokio::test]
async fn test_same_user_concurrent_orders_reserve_once() {
    let h = TestHarness::new();
    h.inventory.set_stock("P1", 1);
    h.cart.set_cart("u1", vec![CartLine::new("P1", 1)]);
    // Both sagas read the cart before either one clears it.
    h.catalog.set_latency(Some(Duration::from_millis(50)));

    let user = UserId::new("u1");
    let (first, second) = tokio::join!(
        h.orchestrator.create_order(user.clone()),
        h.orchestrator.create_order(user.clone()),
    );

    let (won, lost) = match (first, second) {
        (Ok(receipt), Err(e)) | (Err(e), Ok(receipt)) => (receipt, e),
        other => panic!("expected one order and one refusal, got {other:?}"),
    };
    assert_eq!(lost.kind(), "insufficient_stock");
    assert_eq!(won.status, OrderStatus::Completed);
    assert_eq!(h.store.order_count().await, 1);
    assert_eq!(h.stock("P1"), 0);
    assert!(h.cart.cart(&user).is_empty());
    assert!(h.reconciliation.is_empty().await);
}

#[tokio::test]
async fn test_order_ids_are_unique() {
    let h = TestHarness::new();
    h.inventory.set_stock("P3", 100);
    let mut ids = std::collections::HashSet::new();
    for i in 0..20 {
        let user = format!("u{i}");
        h.cart.set_cart(user.as_str(), vec![CartLine::new("P3", 1)]);
        let receipt = h.orchestrator.create_order(UserId::new(user)).await.unwrap();
        assert!(ids.insert(receipt.order_id));
    }
}

#[tokio::test]
async fn test_parallel_item_steps_match_sequential() {
    let h = TestHarness::with_config(OrchestratorConfig {
        parallel_item_steps: true,
        ..fast_config()
    });
    h.fill_cart("u1");

    let receipt = h.orchestrator.create_order(UserId::new("u1")).await.unwrap();
    assert_eq!(receipt.total_price, Money::from_cents(5097));

    let order = h.store.get(receipt.order_id).await.unwrap().unwrap();
    let ids: Vec<_> = order.items().iter().map(|i| i.product_id.as_str()).collect();
    assert_eq!(ids, ["P1", "P2", "P3"]);
}

#[tokio::test]
async fn test_parallel_reservation_failure_restores_successes() {
    let h = TestHarness::with_config(OrchestratorConfig {
        parallel_item_steps: true,
        ..fast_config()
    });
    h.fill_cart("u1");
    h.inventory.set_stock("P3", 1);

    let err = h.orchestrator.create_order(UserId::new("u1")).await.unwrap_err();

    assert_eq!(err.kind(), "insufficient_stock");
    assert_eq!(h.stock("P1"), 10);
    assert_eq!(h.stock("P2"), 10);
    assert_eq!(h.stock("P3"), 1);
}

#[tokio::test]
async fn test_idempotency_key_runs_saga_once() {
    let h = TestHarness::new();
    h.fill_cart("u1");
    let user = UserId::new("u1");

    let (a, b) = tokio::join!(
        h.orchestrator.create_order_idempotent(user.clone(), "req-1"),
        h.orchestrator.create_order_idempotent(user.clone(), "req-1"),
    );

    assert_eq!(a.unwrap().order_id, b.unwrap().order_id);
    assert_eq!(h.payment.charge_count(), 1);
    assert_eq!(h.store.order_count().await, 1);
}

#[tokio::test]
async fn test_idempotency_key_allows_retry_after_safe_failure() {
    let h = TestHarness::new();
    let user = UserId::new("u1");

    let first = h
        .orchestrator
        .create_order_idempotent(user.clone(), "req-1")
        .await;
    assert_eq!(first, Err(SagaError::EmptyCart));

    h.fill_cart("u1");
    let second = h.orchestrator.create_order_idempotent(user, "req-1").await;
    assert!(second.is_ok());
}

#[tokio::test]
async fn test_dropped_request_still_completes_saga() {
    let h = TestHarness::new();
    h.fill_cart("u1");
    h.payment.set_latency(Some(Duration::from_millis(50)));

    let abandoned = tokio::time::timeout(
        Duration::from_millis(5),
        h.orchestrator.create_order(UserId::new("u1")),
    )
    .await;
    assert!(abandoned.is_err());

    for _ in 0..200 {
        if h.store.order_count().await == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.store.order_count().await, 1);
    eventually(|| h.cart.cart(&UserId::new("u1")).is_empty()).await;
}

#[tokio::test]
async fn test_catalog_changes_do_not_touch_stored_orders() {
    let h = TestHarness::new();
    h.cart.set_cart("u1", vec![CartLine::new("P1", 1)]);

    let receipt = h.orchestrator.create_order(UserId::new("u1")).await.unwrap();
    h.catalog
        .add_product("P1", "Widget Pro", Money::from_cents(9999), "seller-1");

    let order = h.store.get(receipt.order_id).await.unwrap().unwrap();
    assert_eq!(order.items()[0].name, "Widget");
    assert_eq!(order.items()[0].unit_price, Money::from_cents(1000));
}
