//! Shop Server - order lifecycle and stock reservation engine for an online store
//!
//! # Architecture
//!
//! - **Orders** (`orders`): `OrdersManager`, actions, redb storage, checkout
//! - **Inventory** (`inventory`): stock ledger and per-product locks
//! - **Scheduler** (`scheduler`): durable auto-cancel / auto-complete / auto-review jobs
//! - **Collaborators** (`services`): catalog, customers, payments, settings, reviews
//! - **Core** (`core`): configuration, state, notification routing, background tasks
//!
//! # Module layout
//!
//! ```text
//! shop-server/src/
//! ├── core/          # config, state, event routing, background tasks
//! ├── inventory/     # stock ledger, product locks
//! ├── orders/        # order entry point, actions, storage
//! ├── scheduler/     # deferred jobs
//! ├── services/      # collaborator interfaces
//! └── utils/         # logging
//! ```

pub mod core;
pub mod inventory;
pub mod orders;
pub mod scheduler;
pub mod services;
pub mod utils;

pub use core::{Config, ServerState};
pub use orders::{Actor, ManagerError, OrderStorage, OrdersManager};
pub use services::Services;
pub use utils::logger::{init_logger, init_logger_with_file};

/// Load `.env`, create the work directory and initialize logging
///
/// Call once at process start, before [`Config::from_env`] is used.
pub fn setup_environment() -> anyhow::Result<Config> {
    dotenv::dotenv().ok();
    let config = Config::from_env();

    std::fs::create_dir_all(&config.work_dir)?;
    let log_dir = config.log_dir();
    init_logger_with_file(
        Some(&config.log_level),
        Some(config.log_json),
        log_dir.to_str(),
    );

    tracing::info!(work_dir = %config.work_dir, shop = %config.shop_name, "Environment ready");
    Ok(config)
}
