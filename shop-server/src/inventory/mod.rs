//! Inventory: stock ledger and per-product locks

pub mod ledger;
pub mod locks;

pub use ledger::{
    LedgerEntry, LedgerError, StockTarget, adjust, available_quantity, strategy_applies,
};
pub use locks::{LockConflict, StockGuard, StockLocks};
