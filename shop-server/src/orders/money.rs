//! Bounds checks for monetary input
//!
//! Every amount is a `Decimal` end to end; these checks only reject values
//! no real order can carry before they reach the ledger or the totals.

use rust_decimal::Decimal;

use crate::orders::traits::OrderError;

/// Maximum allowed unit price or order-level amount
pub const MAX_PRICE: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);
/// Maximum allowed quantity per line
pub const MAX_QUANTITY: i32 = 9999;

/// `0 <= value <= MAX_PRICE`
pub fn require_amount(value: Decimal, field_name: &str) -> Result<(), OrderError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(OrderError::Validation(format!(
            "{} must be non-negative, got {}",
            field_name, value
        )));
    }
    if value > MAX_PRICE {
        return Err(OrderError::Validation(format!(
            "{} exceeds maximum allowed ({}), got {}",
            field_name, MAX_PRICE, value
        )));
    }
    Ok(())
}

/// `0 < quantity <= MAX_QUANTITY`
pub fn require_quantity(quantity: i32, product_id: i64) -> Result<(), OrderError> {
    if quantity <= 0 {
        return Err(OrderError::Validation(format!(
            "Quantity of product {} must be greater than 0",
            product_id
        )));
    }
    if quantity > MAX_QUANTITY {
        return Err(OrderError::Validation(format!(
            "Quantity of product {} exceeds maximum allowed ({}), got {}",
            product_id, MAX_QUANTITY, quantity
        )));
    }
    Ok(())
}

/// Optional amounts are only checked when present
pub fn require_optional_amount(value: Option<Decimal>, field_name: &str) -> Result<(), OrderError> {
    match value {
        Some(v) => require_amount(v, field_name),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_bounds() {
        assert!(require_amount(dec!(0), "fee").is_ok());
        assert!(require_amount(dec!(-0.00), "fee").is_ok());
        assert!(require_amount(dec!(1000000), "fee").is_ok());
        assert!(require_amount(dec!(-0.01), "fee").is_err());
        assert!(require_amount(dec!(1000000.01), "fee").is_err());
        assert!(require_optional_amount(None, "fee").is_ok());
        assert!(require_optional_amount(Some(dec!(-1)), "fee").is_err());
    }

    #[test]
    fn test_quantity_bounds() {
        assert!(require_quantity(1, 1).is_ok());
        assert!(require_quantity(MAX_QUANTITY, 1).is_ok());
        assert!(matches!(require_quantity(0, 1), Err(OrderError::Validation(_))));
        assert!(require_quantity(-3, 1).is_err());
        assert!(require_quantity(MAX_QUANTITY + 1, 1).is_err());
    }
}
