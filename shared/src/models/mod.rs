//! Data models
//!
//! Records owned by collaborators (catalog, customer directory) as the
//! order engine sees them, plus the stock ledger records.
//! All IDs are `i64`.

pub mod address;
pub mod product;
pub mod stock;

// Re-exports
pub use address::*;
pub use product::*;
pub use stock::*;
