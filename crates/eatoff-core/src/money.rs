//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely, plus the
//! `Rate` type for commission / discount / bonus percentages.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  In a settlement engine that drift COMPOUNDS: a weekly settlement       │
//! │  sums hundreds of transactions, and a restaurant is paid the result.   │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    Every amount is i64 cents. Rounding happens exactly once, at the    │
//! │    point a derived value (commission, discount, bonus) is computed,    │
//! │    and settlements sum the already-rounded per-transaction values.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use eatoff_core::money::{Money, Rate};
//!
//! let amount = Money::from_cents(4000);          // €40.00
//! let commission = amount.apply_rate(Rate::from_bps(600)); // 6%
//! assert_eq!(commission.cents(), 240);           // €2.40
//! assert_eq!((amount - commission).cents(), 3760);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in the smallest currency unit (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: Allows negative values for debits in ledger entries
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Derives**: Full serde support for JSON serialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents (the smallest currency unit).
    ///
    /// Using the smallest unit eliminates all floating-point concerns.
    /// The database, calculations, and API all use cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units (euros and cents).
    ///
    /// For negative amounts, only the major unit should be negative:
    /// `from_major_minor(-5, 50)` = -€5.50, not -€4.50.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents (smallest currency unit).
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit (euros) portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Returns the smaller of two amounts.
    #[inline]
    pub fn min(self, other: Money) -> Money {
        Money(self.0.min(other.0))
    }

    /// Applies a basis-point rate, rounding half-up to the nearest cent.
    ///
    /// This is THE rounding point of the engine: commission, discount and
    /// bonus amounts are derived here, once, and every downstream sum works
    /// with the already-rounded cent value.
    ///
    /// ## Example
    /// ```rust
    /// use eatoff_core::money::{Money, Rate};
    ///
    /// // €40.00 at 6% commission = €2.40
    /// let commission = Money::from_cents(4000).apply_rate(Rate::from_bps(600));
    /// assert_eq!(commission.cents(), 240);
    /// ```
    pub fn apply_rate(&self, rate: Rate) -> Money {
        // i128 to prevent overflow on large amounts
        // Formula: amount_cents * bps / 10000, +5000 for half-up rounding
        let cents = (self.0 as i128 * rate.bps() as i128 + 5000) / 10000;
        Money::from_cents(cents as i64)
    }

    /// Subtracts a basis-point discount and returns the discounted amount.
    ///
    /// ## Example
    /// ```rust
    /// use eatoff_core::money::{Money, Rate};
    ///
    /// // €100.00 at 20% off = €80.00
    /// let price = Money::from_cents(10000).apply_discount(Rate::from_bps(2000));
    /// assert_eq!(price.cents(), 8000);
    /// ```
    pub fn apply_discount(&self, discount: Rate) -> Money {
        *self - self.apply_rate(discount)
    }

    /// Multiplies money by a quantity (e.g. meal count × price per meal).
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

// =============================================================================
// Loyalty Points Conversion
// =============================================================================

/// Fixed conversion constant: 100 points = 1 currency unit.
///
/// Since 1 currency unit = 100 cents, this makes 1 point worth exactly
/// 1 cent, which keeps the conversion functions below trivially exact.
pub const POINTS_PER_CURRENCY_UNIT: i64 = 100;

/// Points required to pay a given amount. Pure and stateless.
#[inline]
pub const fn points_for_amount(amount: Money) -> i64 {
    // 100 points per unit and 100 cents per unit: 1 point per cent
    amount.cents()
}

/// Monetary value of a points balance. Pure and stateless.
#[inline]
pub const fn points_value(points: i64) -> Money {
    Money::from_cents(points)
}

/// Points earned for a given spend: 1 point per whole currency unit.
#[inline]
pub const fn points_earned_for_spend(amount: Money) -> i64 {
    amount.cents() / 100
}

// =============================================================================
// Rate Type
// =============================================================================

/// A percentage rate in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000. 550 bps = 5.50%, the platform's default
/// commission. Integer bps keep rate arithmetic exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rate(u32);

/// Platform default commission: 5.5%. A restaurant-specific override,
/// when present, always wins over this default.
pub const DEFAULT_COMMISSION: Rate = Rate::from_bps(550);

impl Rate {
    /// Creates a rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Rate(bps)
    }

    /// Creates a rate from a percentage (for convenience).
    pub fn from_percentage(pct: f64) -> Self {
        Rate((pct * 100.0).round() as u32)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero rate.
    #[inline]
    pub const fn zero() -> Self {
        Rate(0)
    }
}

impl Default for Rate {
    fn default() -> Self {
        Rate::zero()
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display implementation shows money in a human-readable format.
/// For debugging; the UI layer handles localization.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}€{}.{:02}", sign, self.major().abs(), self.minor())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.major(), 10);
        assert_eq!(money.minor(), 99);
    }

    #[test]
    fn test_from_major_minor() {
        let money = Money::from_major_minor(10, 99);
        assert_eq!(money.cents(), 1099);

        let negative = Money::from_major_minor(-5, 50);
        assert_eq!(negative.cents(), -550);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_cents(1099)), "€10.99");
        assert_eq!(format!("{}", Money::from_cents(500)), "€5.00");
        assert_eq!(format!("{}", Money::from_cents(-550)), "-€5.50");
        assert_eq!(format!("{}", Money::from_cents(0)), "€0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((a * 3).cents(), 3000);
    }

    #[test]
    fn test_default_commission() {
        // €40.00 at the 5.5% default = €2.20
        let commission = Money::from_cents(4000).apply_rate(DEFAULT_COMMISSION);
        assert_eq!(commission.cents(), 220);
    }

    #[test]
    fn test_commission_override_rate() {
        // €40.00 at 6% = €2.40, net €37.60
        let amount = Money::from_cents(4000);
        let commission = amount.apply_rate(Rate::from_bps(600));
        assert_eq!(commission.cents(), 240);
        assert_eq!((amount - commission).cents(), 3760);
    }

    #[test]
    fn test_rate_rounding_half_up() {
        // €10.01 at 5.5% = 55.055 cents → 55 cents
        assert_eq!(
            Money::from_cents(1001).apply_rate(Rate::from_bps(550)).cents(),
            55
        );
        // €10.09 at 5.5% = 55.495 → 55; €10.10 = 55.55 → 56
        assert_eq!(
            Money::from_cents(1010).apply_rate(Rate::from_bps(550)).cents(),
            56
        );
    }

    #[test]
    fn test_package_discount() {
        // 10 meals × €10.00 at 20% off = €80.00
        let gross = Money::from_cents(1000).multiply_quantity(10);
        let price = gross.apply_discount(Rate::from_bps(2000));
        assert_eq!(price.cents(), 8000);
    }

    #[test]
    fn test_points_conversion() {
        // 100 points = €1.00, so points == cents
        assert_eq!(points_for_amount(Money::from_cents(2550)), 2550);
        assert_eq!(points_value(2550).cents(), 2550);
    }

    #[test]
    fn test_points_earned() {
        // 1 point per whole currency unit spent
        assert_eq!(points_earned_for_spend(Money::from_cents(3760)), 37);
        assert_eq!(points_earned_for_spend(Money::from_cents(99)), 0);
    }

    #[test]
    fn test_zero_and_checks() {
        let zero = Money::zero();
        assert!(zero.is_zero());
        assert!(!zero.is_positive());
        assert!(!zero.is_negative());

        assert!(Money::from_cents(100).is_positive());
        assert!(Money::from_cents(-100).is_negative());
    }
}
