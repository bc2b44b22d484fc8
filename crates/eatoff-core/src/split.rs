//! # Payment Splitter
//!
//! Pure quoting logic: given a requested amount and a chosen payment
//! method, compute how much is drawn from voucher value, points, cash and
//! general-voucher discount, and validate sufficiency.
//!
//! ## Quote vs. Commit
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  quote() — THIS MODULE (pure)                                           │
//! │    validates against a wallet/voucher SNAPSHOT and produces a           │
//! │    Breakdown; fails with the exact shortfall, no state change          │
//! │                                                                         │
//! │  commit() — payment service + payment repository                        │
//! │    re-applies every portion as a GUARDED debit inside one database      │
//! │    transaction, so a snapshot that went stale between quote and        │
//! │    commit simply fails the commit atomically                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{points_earned_for_spend, points_for_amount, Money};
use crate::types::{
    CustomerGeneralVoucher, CustomerVoucherStatus, PaymentMethod, PurchasedVoucher, VoucherStatus,
};

// =============================================================================
// Inputs
// =============================================================================

/// Balances the quote validates against. A snapshot, not a lock: the
/// commit path re-checks atomically.
#[derive(Debug, Clone, Copy)]
pub struct WalletSnapshot {
    pub cash_balance_cents: i64,
    pub points_balance: i64,
}

/// The caller's chosen payment method with its supporting instrument.
#[derive(Debug)]
pub enum SplitRequest<'a> {
    /// One meal unit of an active package voucher covers the amount.
    Voucher(&'a PurchasedVoucher),
    /// Entirely from the points ledger.
    Points,
    /// Entirely from the cash ledger.
    Cash,
    /// General-voucher discount first, cash for the remainder.
    General(&'a CustomerGeneralVoucher),
    /// Caller-supplied split between points and cash; both portions are
    /// validated independently and committed as a single settlement.
    Mixed {
        points_portion_cents: i64,
        cash_portion_cents: i64,
    },
}

// =============================================================================
// Breakdown
// =============================================================================

/// How a payment amount is funded across the four sources.
///
/// Invariant: `voucher + points-value + cash + discount == amount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakdown {
    pub method: PaymentMethod,
    pub amount_cents: i64,
    pub voucher_id: Option<String>,
    pub voucher_cents: i64,
    pub points_used: i64,
    pub cash_cents: i64,
    pub general_voucher_id: Option<String>,
    pub discount_cents: i64,
}

impl Breakdown {
    /// Points earned on this payment: 1 point per currency unit of the
    /// cash portion, for any non-points payment. Pure-points payments
    /// earn nothing.
    pub fn points_earned(&self) -> i64 {
        if self.method == PaymentMethod::Points {
            0
        } else {
            points_earned_for_spend(Money::from_cents(self.cash_cents))
        }
    }
}

// =============================================================================
// Quote
// =============================================================================

/// Computes a payment breakdown, or the exact insufficiency.
pub fn quote(
    amount: Money,
    request: &SplitRequest<'_>,
    wallet: &WalletSnapshot,
    now: chrono::DateTime<chrono::Utc>,
) -> CoreResult<Breakdown> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "amount".into(),
        }
        .into());
    }

    match request {
        SplitRequest::Voucher(voucher) => quote_voucher(amount, voucher, now),
        SplitRequest::Points => {
            let needed = points_for_amount(amount);
            ensure_points(wallet, needed)?;
            Ok(Breakdown {
                method: PaymentMethod::Points,
                amount_cents: amount.cents(),
                voucher_id: None,
                voucher_cents: 0,
                points_used: needed,
                cash_cents: 0,
                general_voucher_id: None,
                discount_cents: 0,
            })
        }
        SplitRequest::Cash => {
            ensure_cash(wallet, amount)?;
            Ok(Breakdown {
                method: PaymentMethod::Cash,
                amount_cents: amount.cents(),
                voucher_id: None,
                voucher_cents: 0,
                points_used: 0,
                cash_cents: amount.cents(),
                general_voucher_id: None,
                discount_cents: 0,
            })
        }
        SplitRequest::General(voucher) => quote_general(amount, voucher, wallet, now),
        SplitRequest::Mixed {
            points_portion_cents,
            cash_portion_cents,
        } => quote_mixed(amount, *points_portion_cents, *cash_portion_cents, wallet),
    }
}

fn quote_voucher(
    amount: Money,
    voucher: &PurchasedVoucher,
    now: chrono::DateTime<chrono::Utc>,
) -> CoreResult<Breakdown> {
    if voucher.status != VoucherStatus::Active {
        return Err(CoreError::VoucherNotActive {
            status: voucher.status.as_str().to_string(),
        });
    }
    if voucher.is_expired(now) {
        return Err(CoreError::VoucherExpired);
    }
    if voucher.used_meals >= voucher.total_meals {
        return Err(CoreError::VoucherExhausted {
            total_meals: voucher.total_meals,
        });
    }
    // A meal unit is indivisible: its face value must cover the amount
    if voucher.per_meal_value_cents < amount.cents() {
        return Err(CoreError::MealValueTooLow {
            per_meal_cents: voucher.per_meal_value_cents,
            requested_cents: amount.cents(),
        });
    }

    Ok(Breakdown {
        method: PaymentMethod::Voucher,
        amount_cents: amount.cents(),
        voucher_id: Some(voucher.id.clone()),
        voucher_cents: amount.cents(),
        points_used: 0,
        cash_cents: 0,
        general_voucher_id: None,
        discount_cents: 0,
    })
}

fn quote_general(
    amount: Money,
    voucher: &CustomerGeneralVoucher,
    wallet: &WalletSnapshot,
    now: chrono::DateTime<chrono::Utc>,
) -> CoreResult<Breakdown> {
    if voucher.status != CustomerVoucherStatus::Active {
        return Err(CoreError::VoucherNotActive {
            status: format!("{:?}", voucher.status).to_lowercase(),
        });
    }
    if now > voucher.expires_at {
        return Err(CoreError::VoucherExpired);
    }

    // discount = min(amount × discount rule, face value); remainder in cash
    let discount = amount
        .apply_rate(crate::money::Rate::from_bps(voucher.discount_bps))
        .min(Money::from_cents(voucher.face_value_cents));
    let remainder = amount - discount;
    ensure_cash(wallet, remainder)?;

    Ok(Breakdown {
        method: PaymentMethod::GeneralVoucher,
        amount_cents: amount.cents(),
        voucher_id: None,
        voucher_cents: 0,
        points_used: 0,
        cash_cents: remainder.cents(),
        general_voucher_id: Some(voucher.id.clone()),
        discount_cents: discount.cents(),
    })
}

fn quote_mixed(
    amount: Money,
    points_portion_cents: i64,
    cash_portion_cents: i64,
    wallet: &WalletSnapshot,
) -> CoreResult<Breakdown> {
    if points_portion_cents < 0 || cash_portion_cents < 0 {
        return Err(ValidationError::MustBePositive {
            field: "portion".into(),
        }
        .into());
    }
    let sum = points_portion_cents + cash_portion_cents;
    if sum != amount.cents() {
        return Err(ValidationError::PortionMismatch {
            sum_cents: sum,
            expected_cents: amount.cents(),
        }
        .into());
    }

    // Each portion validated independently; either shortfall fails the quote
    let needed_points = points_for_amount(Money::from_cents(points_portion_cents));
    ensure_points(wallet, needed_points)?;
    ensure_cash(wallet, Money::from_cents(cash_portion_cents))?;

    Ok(Breakdown {
        method: PaymentMethod::Mixed,
        amount_cents: amount.cents(),
        voucher_id: None,
        voucher_cents: 0,
        points_used: needed_points,
        cash_cents: cash_portion_cents,
        general_voucher_id: None,
        discount_cents: 0,
    })
}

fn ensure_cash(wallet: &WalletSnapshot, needed: Money) -> CoreResult<()> {
    if wallet.cash_balance_cents < needed.cents() {
        return Err(CoreError::InsufficientFunds {
            shortfall_cents: needed.cents() - wallet.cash_balance_cents,
        });
    }
    Ok(())
}

fn ensure_points(wallet: &WalletSnapshot, needed: i64) -> CoreResult<()> {
    if wallet.points_balance < needed {
        return Err(CoreError::InsufficientPoints {
            shortfall: needed - wallet.points_balance,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
