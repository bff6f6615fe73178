//! Order lifecycle and inventory reservation
//!
//! - **manager**: `OrdersManager`, entry point of every operation
//! - **actions**: one `CommandHandler` per lifecycle operation
//! - **traits**: unit of work (`CommandContext`) and domain errors
//! - **storage**: redb persistence for orders, stock, history and jobs
//! - **checkout**: side-effect-free price quote
//! - **history_worker**: status change log fed by notifications
//!
//! # Architecture
//!
//! ```text
//! Request → OrdersManager → lock products → CommandHandler (write txn) → commit
//!                                                                          ↓
//!                                                    broadcast OrderEvent + wake JobWorker
//!                                                                          ↓
//!                                                        EventRouter → HistoryWorker
//! ```

pub mod actions;
pub mod checkout;
pub mod history_worker;
pub mod manager;
pub mod money;
pub mod storage;
pub mod traits;

pub use checkout::{CheckoutItem, CheckoutLine, CheckoutQuote, CheckoutRequest};
pub use history_worker::HistoryWorker;
pub use manager::{ManagerError, ManagerResult, OrdersManager};
pub use storage::{OrderStorage, StorageError};
pub use traits::{Actor, OrderError};
