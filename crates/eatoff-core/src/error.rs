//! # Error Types
//!
//! Domain-specific error types for eatoff-core.
//!
//! ## Error Taxonomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  Validation errors    → rejected synchronously, no state change        │
//! │  Insufficiency errors → carry the shortfall, no partial debit          │
//! │  Expiry errors        → terminal, caller must re-issue                 │
//! │  Conflict errors      → single-use / exactly-once guards fired         │
//! │  External failures    → recorded as `failed` on the owning entity,     │
//! │                         never revoke already-granted goods             │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → ApiError → HTTP         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Insufficiency variants always carry the shortfall so the caller can
//!    show the customer exactly how much is missing
//! 3. Errors are enum variants, never String

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations of the wallet and voucher engine.
///
/// Every variant here is an *expected* failure path a caller must handle
/// explicitly; none of them leaves partial state behind.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    // ---------- Insufficiency (reported with shortfall, nothing applied) ----
    /// Wallet cash balance cannot cover the requested amount.
    #[error("Insufficient funds: short {shortfall_cents} cents")]
    InsufficientFunds { shortfall_cents: i64 },

    /// Points balance cannot cover the requested amount.
    #[error("Insufficient points: short {shortfall} points")]
    InsufficientPoints { shortfall: i64 },

    /// General voucher sold out: `sold_quantity >= stock_quantity`.
    #[error("Voucher out of stock")]
    OutOfStock,

    /// All meals on the voucher have been redeemed.
    #[error("Voucher exhausted: all {total_meals} meals used")]
    VoucherExhausted { total_meals: i64 },

    // ---------- Voucher state ----------------------------------------------
    /// Voucher is not in `active` status.
    #[error("Voucher is {status}, not active")]
    VoucherNotActive { status: String },

    /// Voucher validity period has passed. Terminal.
    #[error("Voucher expired")]
    VoucherExpired,

    /// The chosen voucher's per-meal value does not cover the requested
    /// amount (a meal unit is indivisible).
    #[error("Meal value {per_meal_cents} cents does not cover {requested_cents} cents")]
    MealValueTooLow {
        per_meal_cents: i64,
        requested_cents: i64,
    },

    // ---------- QR protocol -------------------------------------------------
    /// QR payload older than the 5 minute lifetime. Terminal; re-issue.
    #[error("QR payment request expired")]
    QrExpired,

    /// QR payload was scanned at a different restaurant than encoded.
    #[error("QR encoded for restaurant {expected}, scanned at {actual}")]
    QrRestaurantMismatch { expected: String, actual: String },

    /// The nonce was already consumed: single-use guard fired.
    #[error("QR payment request already used")]
    QrAlreadyUsed,

    /// Signature verification failed: payload was forged or corrupted.
    #[error("QR payload signature invalid")]
    QrInvalidSignature,

    /// Payload is not decodable as a QR payment request.
    #[error("QR payload malformed: {0}")]
    QrMalformed(String),

    // ---------- Purchase / lookup -------------------------------------------
    /// Voucher package id does not exist or is inactive.
    #[error("Voucher package not found: {0}")]
    PackageNotFound(String),

    /// Purchase attempted without a confirmed payment.
    #[error("Payment not confirmed")]
    PaymentNotConfirmed,

    /// Unknown voucher id.
    #[error("Voucher not found: {0}")]
    VoucherNotFound(String),

    /// Unknown customer id.
    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    /// Unknown restaurant id.
    #[error("Restaurant not found: {0}")]
    RestaurantNotFound(String),

    /// Unknown platform voucher id.
    #[error("Platform voucher not found: {0}")]
    PlatformVoucherNotFound(String),

    /// Pay-later authorization requested for an immediate-type voucher.
    #[error("Platform voucher {0} is not a pay-later voucher")]
    NotPayLater(String),

    // ---------- Settlement --------------------------------------------------
    /// Settlement id does not exist.
    #[error("Settlement not found: {0}")]
    SettlementNotFound(String),

    /// `mark_paid` called on a settlement that already transitioned.
    #[error("Settlement already paid")]
    AlreadyPaid,

    /// No unsettled transactions in the requested period.
    #[error("No unsettled transactions in period")]
    NothingToSettle,

    // ---------- Concurrency -------------------------------------------------
    /// A compare-and-swap or serialization retry budget was exhausted.
    /// The caller may retry the whole operation.
    #[error("Transient conflict, retry the operation")]
    TransientConflict,

    // ---------- External collaborators --------------------------------------
    /// Card gateway declined or timed out. The owning entity is recorded
    /// as `failed`; already-granted goods stay granted.
    #[error("Payment gateway failure: {0}")]
    GatewayFailure(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors, rejected before any business logic runs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Amount must be strictly positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g. invalid UUID, invalid date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Period end precedes period start.
    #[error("Period end must not precede period start")]
    InvalidPeriod,

    /// The portions of a mixed payment do not sum to the total.
    #[error("Mixed payment portions sum to {sum_cents}, expected {expected_cents}")]
    PortionMismatch { sum_cents: i64, expected_cents: i64 },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shortfall_message() {
        let err = CoreError::InsufficientFunds { shortfall_cents: 1 };
        assert_eq!(err.to_string(), "Insufficient funds: short 1 cents");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::MustBePositive {
            field: "amount".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }

    #[test]
    fn test_qr_mismatch_message() {
        let err = CoreError::QrRestaurantMismatch {
            expected: "rest-a".into(),
            actual: "rest-b".into(),
        };
        assert_eq!(
            err.to_string(),
            "QR encoded for restaurant rest-a, scanned at rest-b"
        );
    }
}
