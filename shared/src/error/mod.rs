//! Error codes shared between the server and its consumers
//!
//! # Error Code Ranges
//!
//! - 0xxx: General errors
//! - 4xxx: Order errors
//! - 5xxx: Payment errors
//! - 6xxx: Product and stock errors
//! - 9xxx: System errors

mod codes;

pub use codes::{ErrorCode, InvalidErrorCode};
