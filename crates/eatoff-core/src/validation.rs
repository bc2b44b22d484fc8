//! # Business Rule Validation
//!
//! Early input validation, run before any business logic or I/O. Every
//! failure here is synchronous and leaves no state behind.

use chrono::{DateTime, Utc};

use crate::error::ValidationError;

/// Package discounts must stay within 1%–70%.
pub const MIN_DISCOUNT_BPS: u32 = 100;
pub const MAX_DISCOUNT_BPS: u32 = 7000;

/// Validates that a monetary amount is strictly positive.
pub fn validate_amount_cents(field: &str, cents: i64) -> Result<(), ValidationError> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a package discount against the business range.
pub fn validate_discount_bps(bps: u32) -> Result<(), ValidationError> {
    if !(MIN_DISCOUNT_BPS..=MAX_DISCOUNT_BPS).contains(&bps) {
        return Err(ValidationError::OutOfRange {
            field: "discount_bps".to_string(),
            min: MIN_DISCOUNT_BPS as i64,
            max: MAX_DISCOUNT_BPS as i64,
        });
    }
    Ok(())
}

/// Validates a settlement period.
pub fn validate_period(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), ValidationError> {
    if end < start {
        return Err(ValidationError::InvalidPeriod);
    }
    Ok(())
}

/// Validates a non-empty id field.
pub fn validate_required(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}
