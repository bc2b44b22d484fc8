//! # Domain Types
//!
//! Core domain types of the wallet & voucher settlement engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────────┐   ┌──────────────────┐  │
//! │  │    Customer     │   │  WalletTransaction  │   │ PaymentTransaction│ │
//! │  │  ─────────────  │   │  ─────────────────  │   │  ──────────────── │ │
//! │  │  cash balance   │   │  append-only entry  │   │  POS settlement   │ │
//! │  │  points balance │   │  before/after chain │   │  record, immutable│ │
//! │  │  tier (derived) │   └─────────────────────┘   └──────────────────┘  │
//! │  └─────────────────┘                                                   │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────────┐   ┌──────────────────┐  │
//! │  │ VoucherPackage  │──►│  PurchasedVoucher   │   │   Settlement     │  │
//! │  │ GeneralVoucher  │──►│ CustomerGeneralV.   │   │  gross/comm/net  │  │
//! │  │ PlatformVoucher │──►│ CustomerPlatformV.  │   │  pending → paid  │  │
//! │  └─────────────────┘   │  + DeferredPayment  │   └──────────────────┘  │
//! │                        └─────────────────────┘                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has an `id` (UUID v4, immutable, used for relations); the
//! templates (packages, general/platform vouchers) additionally snapshot
//! their pricing fields into the customer-owned instances so history stays
//! correct even if the template is administratively corrected later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::{Money, Rate};

// =============================================================================
// Status Enums
// =============================================================================

/// Selects which of a customer's two ledgers an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    Cash,
    Points,
}

/// Why a ledger entry exists. Append-only; the entry's signed amount plus
/// before/after snapshots make the ledger auditable without replaying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum WalletEntryKind {
    Deposit,
    Payment,
    VoucherPurchase,
    AdminCredit,
    AdminDebit,
    PointsEarned,
    PointsRedeemed,
}

/// Meal-package voucher lifecycle. Transitions are monotone:
/// active → fully_used or active → expired, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum VoucherStatus {
    Active,
    FullyUsed,
    Expired,
}

impl VoucherStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoucherStatus::Active => "active",
            VoucherStatus::FullyUsed => "fully_used",
            VoucherStatus::Expired => "expired",
        }
    }
}

/// Customer-owned general/platform voucher lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum CustomerVoucherStatus {
    Active,
    Used,
    Expired,
}

/// Platform ("Eatoff") voucher payment style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PlatformVoucherKind {
    Immediate,
    PayLater,
}

/// Deferred payment lifecycle. `Capturing` is the claim state that makes
/// concurrent scheduler ticks safe; exactly one terminal transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum DeferredStatus {
    Pending,
    Capturing,
    Charged,
    Failed,
}

/// Point-of-sale transaction outcome. Immutable once completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Completed,
    Failed,
}

/// Restaurant settlement lifecycle: pending → paid, exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Pending,
    Paid,
}

/// How a point-of-sale payment is funded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Voucher,
    Points,
    Cash,
    GeneralVoucher,
    Mixed,
}

// =============================================================================
// Membership Tier
// =============================================================================

/// Membership tier, derived from lifetime points volume. Never stored
/// authority: `tier_for_lifetime_points` recomputes it whenever
/// `total_points_earned` moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum MembershipTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

/// Tier thresholds on `total_points_earned` (1 point ≈ €1 spent).
pub fn tier_for_lifetime_points(total_points_earned: i64) -> MembershipTier {
    match total_points_earned {
        p if p >= 500_000 => MembershipTier::Platinum,
        p if p >= 200_000 => MembershipTier::Gold,
        p if p >= 50_000 => MembershipTier::Silver,
        _ => MembershipTier::Bronze,
    }
}

// =============================================================================
// Customer & Ledger
// =============================================================================

/// A customer's wallet projection: current balances plus lifetime volume.
///
/// Balances are mutated ONLY through the wallet repository's credit/debit
/// operations; nothing else writes these columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Customer {
    pub id: String,
    pub name: String,
    /// Cash balance in cents. Invariant: never negative.
    pub cash_balance_cents: i64,
    /// Loyalty points balance. Invariant: never negative.
    pub points_balance: i64,
    /// Lifetime points earned; drives the membership tier.
    pub total_points_earned: i64,
    pub tier: MembershipTier,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only ledger entry.
///
/// Invariant: for a given (customer, ledger), `balance_after` of entry n
/// equals `balance_before` of entry n+1.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct WalletTransaction {
    pub id: String,
    pub customer_id: String,
    pub ledger: LedgerKind,
    pub kind: WalletEntryKind,
    /// Signed amount: positive for credits, negative for debits.
    /// Cash entries are cents; points entries are points.
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub restaurant_id: Option<String>,
    pub payment_transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Restaurant
// =============================================================================

/// Restaurant financial profile. Catalog CRUD lives elsewhere; the engine
/// reads the commission override and maintains the settlement counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Restaurant {
    pub id: String,
    pub name: String,
    /// Per-restaurant commission override in bps. When present it always
    /// wins over the platform default.
    pub commission_bps: Option<u32>,
    /// Net amount of settlements generated but not yet paid out.
    pub pending_settlement_cents: i64,
    /// Net amount of settlements paid out to date.
    pub total_settled_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl Restaurant {
    /// Effective commission rate: override wins, default otherwise.
    pub fn commission_rate(&self) -> Rate {
        self.commission_bps
            .map(Rate::from_bps)
            .unwrap_or(crate::money::DEFAULT_COMMISSION)
    }
}

// =============================================================================
// Meal-Package Vouchers
// =============================================================================

/// A purchasable bundle of N meals at one restaurant. Immutable once a
/// voucher has been purchased against it except for admin correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct VoucherPackage {
    pub id: String,
    pub restaurant_id: String,
    pub name: String,
    pub meal_count: i64,
    pub price_per_meal_cents: i64,
    /// Discount in bps; business range 100–7000 (1%–70%).
    pub discount_bps: u32,
    /// Validity in months from purchase; ignored when explicit dates set.
    pub validity_months: Option<u32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl VoucherPackage {
    /// Purchase price: meal_count × price_per_meal × (1 − discount).
    pub fn purchase_price(&self) -> Money {
        Money::from_cents(self.price_per_meal_cents)
            .multiply_quantity(self.meal_count)
            .apply_discount(Rate::from_bps(self.discount_bps))
    }

    /// Discount received relative to the undiscounted bundle.
    pub fn discount_amount(&self) -> Money {
        Money::from_cents(self.price_per_meal_cents).multiply_quantity(self.meal_count)
            - self.purchase_price()
    }
}

/// A customer's purchased meal-package voucher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PurchasedVoucher {
    pub id: String,
    pub customer_id: String,
    pub restaurant_id: String,
    pub package_id: String,
    pub total_meals: i64,
    /// Invariant: 0 ≤ used_meals ≤ total_meals, never decreases.
    pub used_meals: i64,
    /// Snapshot of the package's per-meal face value; the amount one
    /// redemption covers at the point of sale.
    pub per_meal_value_cents: i64,
    pub purchase_price_cents: i64,
    pub discount_cents: i64,
    pub expires_at: DateTime<Utc>,
    pub status: VoucherStatus,
    /// Stable redemption reference embedded in the voucher's QR code.
    pub qr_reference: String,
    pub created_at: DateTime<Utc>,
}

impl PurchasedVoucher {
    pub fn remaining_meals(&self) -> i64 {
        self.total_meals - self.used_meals
    }

    pub fn is_expired(&self, at: DateTime<Utc>) -> bool {
        at > self.expires_at
    }
}

// =============================================================================
// General Vouchers
// =============================================================================

/// Platform-wide discount instrument with limited stock.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct GeneralVoucher {
    pub id: String,
    pub name: String,
    /// Maximum discount this voucher can grant on a single payment.
    pub face_value_cents: i64,
    /// Discount rule applied to the payment amount, capped at face value.
    pub discount_bps: u32,
    pub price_cents: i64,
    pub stock_quantity: i64,
    /// Invariant: sold_quantity ≤ stock_quantity.
    pub sold_quantity: i64,
    /// Uses allowed per purchased instance (commonly 1).
    pub usage_limit: i64,
    pub validity_days: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl GeneralVoucher {
    /// Discount granted on `amount`: min(amount × rate, face value).
    pub fn discount_for(&self, amount: Money) -> Money {
        amount
            .apply_rate(Rate::from_bps(self.discount_bps))
            .min(Money::from_cents(self.face_value_cents))
    }
}

/// A customer's purchased general voucher, with snapshot pricing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CustomerGeneralVoucher {
    pub id: String,
    pub customer_id: String,
    pub general_voucher_id: String,
    pub face_value_cents: i64,
    pub discount_bps: u32,
    pub uses_remaining: i64,
    pub expires_at: DateTime<Utc>,
    pub status: CustomerVoucherStatus,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Platform ("Eatoff") Vouchers & Deferred Payments
// =============================================================================

/// Platform voucher template; `PayLater` grants the value immediately and
/// captures the charge on a scheduled date with a bonus incentive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PlatformVoucher {
    pub id: String,
    pub name: String,
    pub price_cents: i64,
    pub discount_bps: u32,
    pub kind: PlatformVoucherKind,
    /// Bonus granted on top of the paid value when deferring. Only
    /// meaningful for `PayLater`.
    pub bonus_bps: u32,
    /// Days until the deferred charge is captured.
    pub payment_term_days: u32,
    pub requires_preauth: bool,
    pub validity_days: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A customer's granted platform voucher (bonus-inclusive value).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CustomerPlatformVoucher {
    pub id: String,
    pub customer_id: String,
    pub platform_voucher_id: String,
    pub value_cents: i64,
    pub expires_at: DateTime<Utc>,
    pub status: CustomerVoucherStatus,
    pub created_at: DateTime<Utc>,
}

/// A deferred ("Pay Later") payment: authorized now, captured on schedule.
///
/// Invariant: `total_value_cents = original_amount_cents + bonus_amount_cents`
/// and every row eventually reaches `charged` or `failed`: a claim stranded
/// in `capturing` goes stale and is reclaimed on a later tick, up to an
/// attempt bound. A failed capture never revokes the already-granted
/// voucher; it is surfaced for manual collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct DeferredPayment {
    pub id: String,
    pub customer_id: String,
    pub platform_voucher_id: String,
    pub customer_platform_voucher_id: String,
    /// Opaque gateway token from `authorize_payment_method`; never raw
    /// card data.
    pub method_token: String,
    /// Amount actually charged on capture. The bonus is never charged.
    pub original_amount_cents: i64,
    pub bonus_amount_cents: i64,
    pub total_value_cents: i64,
    pub scheduled_charge_at: DateTime<Utc>,
    pub status: DeferredStatus,
    pub attempts: i64,
    /// When the row was last claimed for capture; drives stale-claim
    /// recovery after a crash mid-capture.
    pub claimed_at: Option<DateTime<Utc>>,
    pub charged_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Payment Transactions & Settlements
// =============================================================================

/// Point-of-sale settlement record. Immutable once completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PaymentTransaction {
    pub id: String,
    pub customer_id: String,
    pub restaurant_id: String,
    pub total_amount_cents: i64,
    pub method: PaymentMethod,
    // Breakdown: how the total was funded.
    pub voucher_cents: i64,
    pub points_used: i64,
    pub cash_cents: i64,
    pub discount_cents: i64,
    pub commission_bps: u32,
    pub commission_cents: i64,
    pub restaurant_net_cents: i64,
    /// Consumed QR nonce; unique across all transactions.
    pub qr_nonce: String,
    pub status: TransactionStatus,
    /// Set when the transaction is folded into a settlement; guards
    /// against double-counting on overlapping regeneration.
    pub settlement_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A periodic computation of the net amount owed to a restaurant.
///
/// Invariant: `net_cents = gross_cents - commission_cents`, each summed
/// from already-rounded per-transaction values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Settlement {
    pub id: String,
    pub restaurant_id: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub gross_cents: i64,
    /// Informational: the restaurant's rate at generation time. The money
    /// columns are sums of per-transaction values, so if the rate changed
    /// mid-period they reflect each transaction's own rate, not this one.
    pub commission_bps: u32,
    pub commission_cents: i64,
    pub net_cents: i64,
    pub transaction_count: i64,
    pub status: SettlementStatus,
    pub paid_method: Option<String>,
    pub paid_reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn package(meals: i64, per_meal: i64, discount_bps: u32) -> VoucherPackage {
        VoucherPackage {
            id: "pkg-1".into(),
            restaurant_id: "rest-1".into(),
            name: "Lunch deal".into(),
            meal_count: meals,
            price_per_meal_cents: per_meal,
            discount_bps,
            validity_months: Some(6),
            valid_from: None,
            valid_until: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_package_purchase_price() {
        // 10 meals × €10.00 at 20% → €80.00
        let pkg = package(10, 1000, 2000);
        assert_eq!(pkg.purchase_price().cents(), 8000);
        assert_eq!(pkg.discount_amount().cents(), 2000);
    }

    #[test]
    fn test_general_voucher_discount_cap() {
        let voucher = GeneralVoucher {
            id: "gv-1".into(),
            name: "Welcome".into(),
            face_value_cents: 500,
            discount_bps: 1000, // 10%
            price_cents: 200,
            stock_quantity: 100,
            sold_quantity: 0,
            usage_limit: 1,
            validity_days: 30,
            is_active: true,
            created_at: Utc::now(),
        };

        // 10% of €30.00 = €3.00, under the €5.00 face value
        assert_eq!(voucher.discount_for(Money::from_cents(3000)).cents(), 300);
        // 10% of €80.00 = €8.00, capped at face value €5.00
        assert_eq!(voucher.discount_for(Money::from_cents(8000)).cents(), 500);
    }

    #[test]
    fn test_voucher_expiry_check() {
        let expires = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        let voucher = PurchasedVoucher {
            id: "v-1".into(),
            customer_id: "c-1".into(),
            restaurant_id: "r-1".into(),
            package_id: "pkg-1".into(),
            total_meals: 10,
            used_meals: 3,
            per_meal_value_cents: 1000,
            purchase_price_cents: 8000,
            discount_cents: 2000,
            expires_at: expires,
            status: VoucherStatus::Active,
            qr_reference: "ref".into(),
            created_at: Utc::now(),
        };

        assert_eq!(voucher.remaining_meals(), 7);
        assert!(!voucher.is_expired(expires));
        assert!(voucher.is_expired(expires + chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_tier_thresholds() {
        assert_eq!(tier_for_lifetime_points(0), MembershipTier::Bronze);
        assert_eq!(tier_for_lifetime_points(49_999), MembershipTier::Bronze);
        assert_eq!(tier_for_lifetime_points(50_000), MembershipTier::Silver);
        assert_eq!(tier_for_lifetime_points(200_000), MembershipTier::Gold);
        assert_eq!(tier_for_lifetime_points(500_000), MembershipTier::Platinum);
    }

    #[test]
    fn test_commission_override_wins() {
        let restaurant = Restaurant {
            id: "r-1".into(),
            name: "Trattoria".into(),
            commission_bps: Some(600),
            pending_settlement_cents: 0,
            total_settled_cents: 0,
            created_at: Utc::now(),
        };
        assert_eq!(restaurant.commission_rate().bps(), 600);

        let no_override = Restaurant {
            commission_bps: None,
            ..restaurant
        };
        assert_eq!(no_override.commission_rate().bps(), 550);
    }
}
