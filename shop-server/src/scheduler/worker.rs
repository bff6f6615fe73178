//! Job Worker - fires due deferred actions
//!
//! Jobs are written in the same transaction as the order change that
//! created them, so a committed order always has its jobs. The worker runs
//! them at least once: execute, then delete. A failing job is moved forward
//! with exponential backoff and lands in the dead-letter table after
//! `max_attempts`; dead jobs are requeued on the next start.
//!
//! ```text
//! loop
//!   ├─ run every job with due_at <= now
//!   └─ sleep until: next due_at | poll interval | wake-up from the manager | shutdown
//! ```

use std::sync::Arc;
use std::time::Duration;

use shared::util::now_millis;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::ScheduledJob;
use crate::core::Config;
use crate::orders::OrdersManager;

/// Jobs fetched per scan
const BATCH_SIZE: usize = 100;
const RETRY_BASE_DELAY_MS: i64 = 5_000;
const RETRY_MAX_DELAY_MS: i64 = 5 * 60_000;

/// Delay before the next attempt of a job that failed `attempts` times
fn retry_delay_ms(attempts: u32) -> i64 {
    let factor = 1_i64.checked_shl(attempts.min(16)).unwrap_or(i64::MAX);
    RETRY_BASE_DELAY_MS
        .saturating_mul(factor)
        .min(RETRY_MAX_DELAY_MS)
}

pub struct JobWorker {
    manager: Arc<OrdersManager>,
    notify: Arc<Notify>,
    poll_interval: Duration,
    max_attempts: u32,
}

impl JobWorker {
    pub fn new(manager: Arc<OrdersManager>, config: &Config) -> Self {
        Self {
            notify: manager.job_notify(),
            manager,
            poll_interval: config.job_poll_interval(),
            max_attempts: config.job_max_attempts.max(1),
        }
    }

    /// Run every job due at `now`; returns how many were taken off the queue
    pub async fn process_due_jobs(&self, now: i64) -> usize {
        let storage = self.manager.storage();
        let jobs = match storage.get_due_jobs(now, BATCH_SIZE) {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load due jobs");
                return 0;
            }
        };

        let mut done = 0;
        for job in jobs {
            if self.run_job(&job, now).await {
                done += 1;
            }
        }
        done
    }

    /// Returns true when the job left the pending queue
    async fn run_job(&self, job: &ScheduledJob, now: i64) -> bool {
        let storage = self.manager.storage();
        let order_id = job.action.order_id();

        let failure = match self.manager.execute_job(&job.action, now).await {
            Ok(()) => {
                tracing::debug!(job_id = job.job_id, order_id, action = job.action.name(), "Job done");
                None
            }
            Err(e) if e.is_stale_job() => {
                tracing::info!(
                    job_id = job.job_id,
                    order_id,
                    action = job.action.name(),
                    reason = %e,
                    "Job no longer applies, skipped"
                );
                None
            }
            Err(e) => Some(e.to_string()),
        };

        let Some(error) = failure else {
            if let Err(e) = storage.complete_job(job) {
                tracing::error!(job_id = job.job_id, error = %e, "Failed to remove finished job");
                return false;
            }
            return true;
        };

        if job.attempts + 1 >= self.max_attempts {
            tracing::error!(
                job_id = job.job_id,
                order_id,
                action = job.action.name(),
                attempts = job.attempts + 1,
                error = %error,
                "Job exhausted its attempts, moved to dead letter"
            );
            if let Err(e) = storage.move_job_to_dead_letter(job, &error) {
                tracing::error!(job_id = job.job_id, error = %e, "Failed to dead-letter job");
                return false;
            }
            return true;
        }

        let due_at = now + retry_delay_ms(job.attempts);
        tracing::warn!(
            job_id = job.job_id,
            order_id,
            action = job.action.name(),
            attempt = job.attempts + 1,
            retry_at = due_at,
            error = %error,
            "Job failed, will retry"
        );
        if let Err(e) = storage.reschedule_job(job, due_at, Some(&error)) {
            tracing::error!(job_id = job.job_id, error = %e, "Failed to reschedule job");
        }
        false
    }

    /// How long to sleep before the next scan
    fn idle_time(&self, now: i64) -> Duration {
        match self.manager.storage().next_due_at() {
            Ok(Some(due_at)) => {
                let wait = Duration::from_millis(due_at.saturating_sub(now).max(0) as u64);
                wait.min(self.poll_interval)
            }
            Ok(None) => self.poll_interval,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read next job due time");
                self.poll_interval
            }
        }
    }

    /// Main loop; returns when `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            max_attempts = self.max_attempts,
            "Job worker started"
        );

        match self.manager.storage().recover_dead_jobs(now_millis()) {
            Ok(0) => {}
            Ok(n) => tracing::info!(count = n, "Recovered dead jobs to pending queue"),
            Err(e) => tracing::error!(error = %e, "Failed to recover dead jobs"),
        }

        loop {
            let now = now_millis();
            let done = self.process_due_jobs(now).await;
            if done > 0 {
                tracing::debug!(count = done, "Processed due jobs");
            }

            let idle = self.idle_time(now_millis());
            tokio::select! {
                _ = tokio::time::sleep(idle) => {}
                _ = self.notify.notified() => {
                    tracing::trace!("Job worker woken by new jobs");
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Job worker stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::manager::{CreateOrderParams, OrderItemParam};
    use crate::orders::storage::OrderStorage;
    use crate::orders::traits::Actor;
    use crate::scheduler::ScheduledAction;
    use crate::services::memory::MemoryServices;
    use crate::services::{ReviewService, ServiceError, ServiceResult};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use shared::models::{AddressSnapshot, ProductInfo, StockLine};
    use shared::order::{OrderStatus, StockReduceStrategy};

    struct BrokenReviews;

    #[async_trait::async_trait]
    impl ReviewService for BrokenReviews {
        async fn auto_positive_review(&self, _product_id: i64, _order_id: i64) -> ServiceResult<()> {
            Err(ServiceError::unavailable("reviews", "connection refused"))
        }
    }

    fn setup(broken_reviews: bool) -> (Arc<OrdersManager>, Config) {
        let storage = OrderStorage::open_in_memory().unwrap();
        let memory = MemoryServices::new(30, 60, 120);
        memory.catalog.upsert(ProductInfo {
            id: 1,
            name: "Tea".to_string(),
            price: dec!(10.00),
            is_published: true,
            is_allow_to_order: true,
            stock_tracking_enabled: true,
            stock_reduce_strategy: StockReduceStrategy::PlaceOrderWithhold,
            thumbnail_url: None,
            display_stock_quantity: false,
        });
        memory.customers.add_customer(42, Some("openid-42"));
        memory.customers.add_address(1, 42, AddressSnapshot::default());
        storage.put_stock_line(&StockLine::new(1, 1, 10, 0)).unwrap();

        let mut services = memory.services();
        if broken_reviews {
            services.reviews = Arc::new(BrokenReviews);
        }
        let mut config = Config::with_work_dir("./unused");
        config.job_max_attempts = 2;
        let manager = Arc::new(OrdersManager::new(storage, services, &config));
        (manager, config)
    }

    fn params() -> CreateOrderParams {
        CreateOrderParams {
            customer_id: 42,
            items: vec![OrderItemParam { product_id: 1, quantity: 4 }],
            shipping_address_id: 1,
            billing_address_id: None,
            shipping_method: Default::default(),
            payment_type: Default::default(),
            shipping_fee: Decimal::ZERO,
            discount: Decimal::ZERO,
            order_note: None,
            admin_note: None,
        }
    }

    #[test]
    fn test_retry_delay_grows_and_caps() {
        assert_eq!(retry_delay_ms(0), 5_000);
        assert_eq!(retry_delay_ms(1), 10_000);
        assert_eq!(retry_delay_ms(3), 40_000);
        assert_eq!(retry_delay_ms(10), RETRY_MAX_DELAY_MS);
        assert_eq!(retry_delay_ms(u32::MAX), RETRY_MAX_DELAY_MS);
    }

    #[tokio::test]
    async fn test_due_auto_cancel_runs_once() {
        let (manager, config) = setup(false);
        let order = manager.create_order(Actor::Customer(42), params()).await.unwrap();
        let worker = JobWorker::new(manager.clone(), &config);
        let due = order.payment_end_on.unwrap();

        // not yet due
        assert_eq!(worker.process_due_jobs(due - 1).await, 0);
        assert_eq!(
            manager.get_order(order.order_id).unwrap().unwrap().status,
            OrderStatus::PendingPayment
        );

        assert_eq!(worker.process_due_jobs(due).await, 1);
        let order = manager.get_order(order.order_id).unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Canceled);
        assert!(manager.storage().get_pending_jobs().unwrap().is_empty());

        let stock: i32 = manager.get_stock_lines(1).unwrap().iter().map(|l| l.quantity).sum();
        assert_eq!(stock, 10);
    }

    #[tokio::test]
    async fn test_stale_job_is_dropped() {
        let (manager, config) = setup(false);
        let order = manager.create_order(Actor::Customer(42), params()).await.unwrap();
        manager
            .payment_received(crate::orders::manager::PaymentReceivedParams {
                order_id: Some(order.order_id),
                ..Default::default()
            })
            .await
            .unwrap();

        let worker = JobWorker::new(manager.clone(), &config);
        assert_eq!(worker.process_due_jobs(order.payment_end_on.unwrap()).await, 1);
        assert!(manager.storage().get_pending_jobs().unwrap().is_empty());
        assert!(manager.storage().get_dead_jobs().unwrap().is_empty());
        assert_eq!(
            manager.get_order(order.order_id).unwrap().unwrap().status,
            OrderStatus::PaymentReceived
        );
    }

    #[tokio::test]
    async fn test_failing_job_retries_then_dead_letters() {
        let (manager, config) = setup(true);
        let mut job = ScheduledJob::new(
            ScheduledAction::AutoReview {
                order_id: 1,
                product_id: 1,
            },
            1_000,
            0,
        );
        manager.storage().schedule_job(&mut job).unwrap();
        let worker = JobWorker::new(manager.clone(), &config);

        // first failure: moved forward by the base delay
        assert_eq!(worker.process_due_jobs(1_000).await, 0);
        let pending = manager.storage().get_pending_jobs().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[0].due_at, 1_000 + RETRY_BASE_DELAY_MS);
        assert!(pending[0].last_error.is_some());

        // second failure reaches the limit
        assert_eq!(worker.process_due_jobs(1_000 + RETRY_BASE_DELAY_MS).await, 1);
        assert!(manager.storage().get_pending_jobs().unwrap().is_empty());
        let dead = manager.storage().get_dead_jobs().unwrap();
        assert_eq!(dead.len(), 1);
        assert!(dead[0].last_error.contains("reviews"));

        // a restart puts it back
        assert_eq!(manager.storage().recover_dead_jobs(50_000).unwrap(), 1);
        let pending = manager.storage().get_pending_jobs().unwrap();
        assert_eq!(pending[0].attempts, 0);
        assert_eq!(pending[0].due_at, 50_000);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (manager, config) = setup(false);
        let worker = JobWorker::new(manager, &config);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(worker.run(shutdown.clone()));

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
