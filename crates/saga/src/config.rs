//! Orchestrator tuning loaded from environment variables.

use std::time::Duration;

use crate::retry::RetryPolicy;

/// Timeouts, deadlines and retry policies for order creation.
///
/// Reads from environment variables (all optional):
/// - `CART_TIMEOUT_MS`, `CATALOG_TIMEOUT_MS`, `INVENTORY_TIMEOUT_MS` (default: `5000`)
/// - `PAYMENT_TIMEOUT_MS` (default: `10000`)
/// - `STORE_TIMEOUT_MS` (default: `5000`)
/// - `SAGA_DEADLINE_MS`: bound on everything before the commit point (default: `30000`)
/// - `COMPENSATION_MAX_ATTEMPTS` (default: `3`), `COMPENSATION_INITIAL_BACKOFF_MS` (default: `200`)
/// - `CART_CLEAR_MAX_ATTEMPTS` (default: `5`), `CART_CLEAR_INITIAL_BACKOFF_MS` (default: `500`)
/// - `PARALLEL_ITEM_STEPS`: price and reserve lines concurrently (default: `false`)
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub cart_timeout: Duration,
    pub catalog_timeout: Duration,
    pub inventory_timeout: Duration,
    pub payment_timeout: Duration,
    pub store_timeout: Duration,
    pub saga_deadline: Duration,
    pub compensation_retry: RetryPolicy,
    pub cart_clear_retry: RetryPolicy,
    pub parallel_item_steps: bool,
}

impl OrchestratorConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cart_timeout: env_millis("CART_TIMEOUT_MS").unwrap_or(defaults.cart_timeout),
            catalog_timeout: env_millis("CATALOG_TIMEOUT_MS").unwrap_or(defaults.catalog_timeout),
            inventory_timeout: env_millis("INVENTORY_TIMEOUT_MS")
                .unwrap_or(defaults.inventory_timeout),
            payment_timeout: env_millis("PAYMENT_TIMEOUT_MS").unwrap_or(defaults.payment_timeout),
            store_timeout: env_millis("STORE_TIMEOUT_MS").unwrap_or(defaults.store_timeout),
            saga_deadline: env_millis("SAGA_DEADLINE_MS").unwrap_or(defaults.saga_deadline),
            compensation_retry: RetryPolicy::new(
                env_parse("COMPENSATION_MAX_ATTEMPTS")
                    .unwrap_or(defaults.compensation_retry.max_attempts),
                env_millis("COMPENSATION_INITIAL_BACKOFF_MS")
                    .unwrap_or(defaults.compensation_retry.initial_backoff),
            ),
            cart_clear_retry: RetryPolicy::new(
                env_parse("CART_CLEAR_MAX_ATTEMPTS")
                    .unwrap_or(defaults.cart_clear_retry.max_attempts),
                env_millis("CART_CLEAR_INITIAL_BACKOFF_MS")
                    .unwrap_or(defaults.cart_clear_retry.initial_backoff),
            ),
            parallel_item_steps: env_parse("PARALLEL_ITEM_STEPS")
                .unwrap_or(defaults.parallel_item_steps),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cart_timeout: Duration::from_secs(5),
            catalog_timeout: Duration::from_secs(5),
            inventory_timeout: Duration::from_secs(5),
            payment_timeout: Duration::from_secs(10),
            store_timeout: Duration::from_secs(5),
            saga_deadline: Duration::from_secs(30),
            compensation_retry: RetryPolicy::new(3, Duration::from_millis(200)),
            cart_clear_retry: RetryPolicy::new(5, Duration::from_millis(500)),
            parallel_item_steps: false,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_millis(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_millis)
}
