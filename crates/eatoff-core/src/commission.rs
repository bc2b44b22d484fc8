//! # Commission & Pay-Later Math
//!
//! Pure arithmetic for the platform's cut of a transaction and for the
//! deferred-payment bonus. Rounding to the cent happens exactly once, when
//! a derived value is computed; sums downstream work on rounded cents.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::money::{Money, Rate, DEFAULT_COMMISSION};

// =============================================================================
// Commission
// =============================================================================

/// A transaction's commission split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionSplit {
    pub rate_bps: u32,
    pub commission_cents: i64,
    pub restaurant_net_cents: i64,
}

/// Splits `amount` between platform commission and restaurant net.
///
/// `override_bps` is the restaurant's commission override; when present it
/// always wins over the 5.5% platform default.
pub fn split_commission(amount: Money, override_bps: Option<u32>) -> CommissionSplit {
    let rate = override_bps.map(Rate::from_bps).unwrap_or(DEFAULT_COMMISSION);
    let commission = amount.apply_rate(rate);
    CommissionSplit {
        rate_bps: rate.bps(),
        commission_cents: commission.cents(),
        restaurant_net_cents: (amount - commission).cents(),
    }
}

// =============================================================================
// Pay-Later Terms
// =============================================================================

/// Computed terms of a deferred ("Pay Later") authorization.
///
/// Invariant: `total_value = original + bonus`. Only `original` is ever
/// charged; the bonus exists purely as granted voucher value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayLaterTerms {
    pub original_cents: i64,
    pub bonus_cents: i64,
    pub total_value_cents: i64,
    pub scheduled_charge_at: DateTime<Utc>,
}

/// Computes pay-later terms from a voucher's discounted price.
pub fn pay_later_terms(
    price: Money,
    discount: Rate,
    bonus: Rate,
    payment_term_days: u32,
    now: DateTime<Utc>,
) -> PayLaterTerms {
    let original = price.apply_discount(discount);
    let bonus_amount = original.apply_rate(bonus);
    PayLaterTerms {
        original_cents: original.cents(),
        bonus_cents: bonus_amount.cents(),
        total_value_cents: (original + bonus_amount).cents(),
        scheduled_charge_at: now + Duration::days(payment_term_days as i64),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
