use std::sync::Arc;

use anyhow::Context;
use shared::order::OrderEvent;
use tokio::sync::mpsc;

use crate::core::Config;
use crate::core::event_router::EventRouter;
use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::orders::{HistoryWorker, OrderStorage, OrdersManager};
use crate::scheduler::JobWorker;
use crate::services::Services;

/// History channel buffer (critical path, sized generously)
const HISTORY_CHANNEL_CAPACITY: usize = 1024;
/// Outbound notification buffer (best-effort)
const NOTIFY_CHANNEL_CAPACITY: usize = 256;

/// Server state - shared handles to the order engine
///
/// | Field | Type | Description |
/// |------|------|------|
/// | config | Config | Settings (immutable) |
/// | storage | OrderStorage | redb storage |
/// | manager | Arc<OrdersManager> | Order entry point |
///
/// Cloning is cheap: every field is shared.
#[derive(Clone, Debug)]
pub struct ServerState {
    pub config: Config,
    pub storage: OrderStorage,
    pub manager: Arc<OrdersManager>,
}

impl ServerState {
    /// Open the database under `config.work_dir` and build the manager
    pub fn initialize(config: Config, services: Services) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.work_dir)
            .with_context(|| format!("Failed to create work dir {}", config.work_dir))?;
        let db_path = config.database_path();
        let storage = OrderStorage::open(&db_path)
            .with_context(|| format!("Failed to open order database {}", db_path.display()))?;

        match storage.get_stats() {
            Ok(stats) => tracing::info!(
                orders = stats.order_count,
                pending_jobs = stats.pending_jobs,
                dead_jobs = stats.dead_jobs,
                "Order storage opened"
            ),
            Err(e) => tracing::warn!(error = %e, "Failed to read storage stats"),
        }

        let manager = Arc::new(OrdersManager::new(storage.clone(), services, &config));
        Ok(Self {
            config,
            storage,
            manager,
        })
    }

    /// Start the event router, history worker and job worker
    ///
    /// Returns the supervisor and the receiving end of the outbound
    /// notification channel, for email/SMS delivery by the embedder.
    pub fn start_background_tasks(&self) -> (BackgroundTasks, mpsc::Receiver<Arc<OrderEvent>>) {
        let mut tasks = BackgroundTasks::new();
        let (router, channels) = EventRouter::new(HISTORY_CHANNEL_CAPACITY, NOTIFY_CHANNEL_CAPACITY);

        // The manager keeps its sender alive, so the router stops on the token
        let source = self.manager.subscribe();
        let token = tasks.shutdown_token();
        tasks.spawn("event_router", TaskKind::Listener, async move {
            tokio::select! {
                _ = router.run(source) => {}
                _ = token.cancelled() => {}
            }
        });

        let history = HistoryWorker::new(self.storage.clone());
        tasks.spawn("history_worker", TaskKind::Worker, history.run(channels.history_rx));

        let jobs = JobWorker::new(self.manager.clone(), &self.config);
        tasks.spawn("job_worker", TaskKind::Worker, jobs.run(tasks.shutdown_token()));

        tasks.log_summary();
        (tasks, channels.notify_rx)
    }
}
