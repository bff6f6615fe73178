//! Numeric error codes for the order engine
//!
//! Codes are grouped by range:
//! - 0xxx: General errors
//! - 4xxx: Order errors
//! - 5xxx: Payment errors
//! - 6xxx: Product and stock errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for compact serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,

    // ==================== 4xxx: Order ====================
    /// Order not found
    OrderNotFound = 4001,
    /// Order item not found
    OrderItemNotFound = 4002,
    /// Order has no orderable items
    OrderEmpty = 4003,
    /// Transition not allowed from the current status
    IllegalStateTransition = 4004,
    /// Shipment exceeds ordered quantity
    OverShipment = 4005,
    /// Concurrent modification could not be resolved
    ConcurrencyConflict = 4006,

    // ==================== 5xxx: Payment ====================
    /// Payment gateway failure
    PaymentFailed = 5001,

    // ==================== 6xxx: Product ====================
    /// Product not found or not orderable
    ProductUnavailable = 6001,
    /// Not enough stock
    InsufficientStock = 6002,

    // ==================== 9xxx: System ====================
    /// Internal error
    InternalError = 9001,
    /// An external collaborator failed
    ServiceUnavailable = 9002,
    /// Storage full (disk space exhausted)
    StorageFull = 9401,
    /// Storage corrupted (data file damaged)
    StorageCorrupted = 9403,
    /// System busy (IO error, retry later)
    SystemBusy = 9404,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Default human readable message
    pub const fn message(&self) -> &'static str {
        match self {
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::OrderNotFound => "Order not found",
            ErrorCode::OrderItemNotFound => "Order item not found",
            ErrorCode::OrderEmpty => "Order has no orderable items",
            ErrorCode::IllegalStateTransition => "Operation not allowed in the current order status",
            ErrorCode::OverShipment => "Shipped quantity exceeds ordered quantity",
            ErrorCode::ConcurrencyConflict => "Concurrent modification, please retry",
            ErrorCode::PaymentFailed => "Payment request failed",
            ErrorCode::ProductUnavailable => "Product is not available for ordering",
            ErrorCode::InsufficientStock => "Insufficient stock",
            ErrorCode::InternalError => "Internal error",
            ErrorCode::ServiceUnavailable => "Service unavailable",
            ErrorCode::StorageFull => "Storage is full",
            ErrorCode::StorageCorrupted => "Storage is corrupted",
            ErrorCode::SystemBusy => "System busy, please retry",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:04}: {}", self.code(), self.message())
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),

            4001 => Ok(ErrorCode::OrderNotFound),
            4002 => Ok(ErrorCode::OrderItemNotFound),
            4003 => Ok(ErrorCode::OrderEmpty),
            4004 => Ok(ErrorCode::IllegalStateTransition),
            4005 => Ok(ErrorCode::OverShipment),
            4006 => Ok(ErrorCode::ConcurrencyConflict),

            5001 => Ok(ErrorCode::PaymentFailed),

            6001 => Ok(ErrorCode::ProductUnavailable),
            6002 => Ok(ErrorCode::InsufficientStock),

            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::ServiceUnavailable),
            9401 => Ok(ErrorCode::StorageFull),
            9403 => Ok(ErrorCode::StorageCorrupted),
            9404 => Ok(ErrorCode::SystemBusy),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}
