//! Order Module
//!
//! Types of the order lifecycle engine:
//! - Snapshot: the persisted order aggregate (items, addresses, totals)
//! - Events: notifications published after each committed change
//! - Types: status enums and the user-facing command error

pub mod event;
pub mod snapshot;
pub mod types;

// Re-exports
pub use event::{EventPayload, OrderEvent, OrderEventType};
pub use snapshot::{
    Order, OrderHistoryEntry, OrderItem, Shipment, ShipmentItem, round_money,
};
pub use types::*;
