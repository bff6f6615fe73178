//! Shared types for the shop order engine
//!
//! Domain data used by the server and by any consumer of its notifications:
//! the order aggregate, status enums, events, stock records and
//! catalog/address snapshots, plus error codes and id/time helpers.

pub mod error;
pub mod models;
pub mod order;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use error::ErrorCode;
pub use order::{CommandError, CommandErrorCode, Order, OrderEvent, OrderStatus};
