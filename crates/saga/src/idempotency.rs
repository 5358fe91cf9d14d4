//! Deduplication of order-creation requests by client-supplied key.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::UserId;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::SagaError;

type SharedOutcome<T> = Shared<BoxFuture<'static, Result<T, SagaError>>>;

struct Entry<T> {
    created_at: Instant,
    outcome: SharedOutcome<T>,
}

/// Maps `(user, key)` to the single saga run started for it.
///
/// Concurrent and later requests with the same key await the same outcome
/// instead of starting a second saga. Retry-safe failures are evicted so
/// the key can be used again; successes and unknown outcomes are kept until
/// `ttl` passes.
pub struct IdempotencyCache<T> {
    entries: Arc<Mutex<HashMap<(UserId, String), Entry<T>>>>,
    ttl: Duration,
}

impl<T> Clone for IdempotencyCache<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            ttl: self.ttl,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> IdempotencyCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Returns the outcome for `key`, calling `start` only if none exists.
    ///
    /// `start` must hand back a future that keeps running on its own (for
    /// example a spawned task), since every waiter may be dropped.
    pub async fn run<F>(&self, user_id: &UserId, key: &str, start: F) -> Result<T, SagaError>
    where
        F: FnOnce() -> BoxFuture<'static, Result<T, SagaError>>,
    {
        let cache_key = (user_id.clone(), key.to_string());
        let outcome = {
            let mut entries = self.entries.lock().await;
            let ttl = self.ttl;
            entries.retain(|_, entry| entry.created_at.elapsed() < ttl);
            entries
                .entry(cache_key.clone())
                .or_insert_with(|| Entry {
                    created_at: Instant::now(),
                    outcome: start().shared(),
                })
                .outcome
                .clone()
        };

        let result = outcome.clone().await;
        if let Err(e) = &result
            && e.is_retry_safe()
        {
            let mut entries = self.entries.lock().await;
            // Only evict the run we awaited; a fresh one may already be in.
            if entries
                .get(&cache_key)
                .is_some_and(|entry| entry.outcome.ptr_eq(&outcome))
            {
                entries.remove(&cache_key);
            }
        }
        result
    }

    /// Returns the number of cached keys.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
