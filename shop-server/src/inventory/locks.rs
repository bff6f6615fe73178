//! Per-product stock locks
//!
//! Every operation that moves stock holds the locks of all products it
//! touches. Locks are taken in ascending product id order so two operations
//! over overlapping product sets cannot deadlock. A lock that cannot be
//! taken within the timeout releases everything held so far, backs off and
//! retries; after the last attempt the caller gets a conflict error.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, thiserror::Error)]
#[error("Could not lock stock of product {product_id} after {attempts} attempts")]
pub struct LockConflict {
    pub product_id: i64,
    pub attempts: u32,
}

/// Guards for a set of products, released on drop
#[derive(Debug)]
pub struct StockGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
    product_ids: Vec<i64>,
}

impl StockGuard {
    pub fn product_ids(&self) -> &[i64] {
        &self.product_ids
    }
}

#[derive(Debug, Clone)]
pub struct StockLocks {
    locks: Arc<DashMap<i64, Arc<Mutex<()>>>>,
    timeout: Duration,
    max_attempts: u32,
}

impl StockLocks {
    pub fn new(timeout: Duration, max_attempts: u32) -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
            timeout,
            max_attempts: max_attempts.max(1),
        }
    }

    fn lock_for(&self, product_id: i64) -> Arc<Mutex<()>> {
        self.locks
            .entry(product_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire the locks of every product in `product_ids`
    ///
    /// Duplicates are ignored; an empty set returns an empty guard at once.
    pub async fn acquire(&self, product_ids: &[i64]) -> Result<StockGuard, LockConflict> {
        let mut ids = product_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_acquire_all(&ids).await {
                Ok(guards) => {
                    return Ok(StockGuard {
                        _guards: guards,
                        product_ids: ids,
                    });
                }
                Err(product_id) if attempt >= self.max_attempts => {
                    tracing::warn!(product_id, attempts = attempt, "Stock lock conflict");
                    return Err(LockConflict {
                        product_id,
                        attempts: attempt,
                    });
                }
                Err(product_id) => {
                    let backoff = Duration::from_millis(10 * (1 << attempt.min(6)));
                    tracing::debug!(product_id, attempt, ?backoff, "Stock lock timeout, retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// On timeout, returns the product id that could not be locked. Guards
    /// acquired before it are dropped on return.
    async fn try_acquire_all(&self, ids: &[i64]) -> Result<Vec<OwnedMutexGuard<()>>, i64> {
        let mut guards = Vec::with_capacity(ids.len());
        for &id in ids {
            let lock = self.lock_for(id);
            match tokio::time::timeout(self.timeout, lock.lock_owned()).await {
                Ok(guard) => guards.push(guard),
                Err(_) => return Err(id),
            }
        }
        Ok(guards)
    }
}
