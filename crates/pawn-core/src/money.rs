//! # Money Module
//!
//! Fixed-point money, percentage rates and day counts.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │    0.1 + 0.2 = 0.30000000000000004                                      │
//! │                                                                         │
//! │  A pawn loan is touched many times (origination, partial payments,     │
//! │  renewals, late fees). Float drift would leave a loan that can never   │
//! │  be paid off exactly, or a drawer that never reconciles.               │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents + Basis Point Rates                        │
//! │    1000.00 at 10%    = 100000 cents × 1000 bps / 10000 = 10000 cents    │
//! │    Rounding happens once, at the end of each calculation              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use pawn_core::money::{Money, Rate};
//!
//! let principal = Money::from_major_minor(1000, 0);
//! let interest = principal.apply_rate(Rate::from_percent(10));
//! assert_eq!(interest, Money::from_major_minor(100, 0));
//! ```

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use ts_rs::TS;

/// Basis points in one whole (100%).
pub const BPS_SCALE: i128 = 10_000;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// Signed so that cash movements can carry their direction: incomes are
/// positive, expenses negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ```rust
    /// use pawn_core::money::Money;
    ///
    /// let fee = Money::from_cents(1099);
    /// assert_eq!(fee.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// For negative amounts only the major unit is negative:
    /// `from_major_minor(-5, 50)` is -5.50.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Returns the smaller of two amounts.
    #[inline]
    pub fn min(self, other: Money) -> Money {
        if self <= other {
            self
        } else {
            other
        }
    }

    /// Subtracts and clamps at zero. Used for outstanding buckets, which can
    /// never be negative.
    #[inline]
    pub fn saturating_sub(self, other: Money) -> Money {
        Money((self.0 - other.0).max(0))
    }

    /// Applies a percentage rate, rounding half away from zero.
    ///
    /// ```rust
    /// use pawn_core::money::{Money, Rate};
    ///
    /// // 10.00 at 8.25% = 0.825 -> 0.83
    /// let tax = Money::from_cents(1000).apply_rate(Rate::from_bps(825));
    /// assert_eq!(tax.cents(), 83);
    /// ```
    pub fn apply_rate(&self, rate: Rate) -> Money {
        Money(round_bps(self.0 as i128 * rate.bps() as i128))
    }

    /// Applies a daily rate over a number of days with a single rounding step.
    ///
    /// `amount × rate × days`, so 500.00 at 0.5%/day for 3 days is 7.50.
    pub fn apply_daily_rate(&self, rate: Rate, days: i64) -> Money {
        if days <= 0 {
            return Money::zero();
        }
        Money(round_bps(
            self.0 as i128 * rate.bps() as i128 * days as i128,
        ))
    }

    /// Splits the amount into `parts` shares, rounding the share up so that
    /// `share × parts` always covers the amount.
    pub fn ceil_div(&self, parts: u32) -> Money {
        if parts == 0 {
            return *self;
        }
        let parts = parts as i64;
        Money((self.0 + parts - 1).div_euclid(parts))
    }
}

/// Divides by the basis point scale, rounding half away from zero.
fn round_bps(scaled: i128) -> i64 {
    let half = BPS_SCALE / 2;
    let rounded = if scaled >= 0 {
        (scaled + half) / BPS_SCALE
    } else {
        (scaled - half) / BPS_SCALE
    };
    rounded as i64
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug formatting only; the UI owns localized display.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor())
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

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Rate
// =============================================================================

/// A percentage rate in basis points (1 bps = 0.01%).
///
/// Interest rates are per term (1000 bps = 10% of principal for the term);
/// late fee rates are per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct Rate(u32);

impl Rate {
    /// 100% in basis points.
    pub const MAX_PERCENT_BPS: u32 = 10_000;

    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Rate(bps)
    }

    /// Creates a rate from a whole percentage.
    #[inline]
    pub const fn from_percent(pct: u32) -> Self {
        Rate(pct * 100)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Rate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for Rate {
    fn default() -> Self {
        Rate::zero()
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

// =============================================================================
// Day Counts
// =============================================================================

/// Whole calendar days from `from` to `to` (negative when `to` is earlier).
#[inline]
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// Adds a number of days to a date.
#[inline]
pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    date + Duration::days(days)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_major_minor() {
        assert_eq!(Money::from_major_minor(10, 99).cents(), 1099);
        assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "10.99");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::zero().to_string(), "0.00");
        assert_eq!(Rate::from_bps(825).to_string(), "8.25%");
    }

    #[test]
    fn test_flat_interest() {
        let principal = Money::from_major_minor(1000, 0);
        assert_eq!(
            principal.apply_rate(Rate::from_percent(10)),
            Money::from_major_minor(100, 0)
        );
        assert_eq!(principal.apply_rate(Rate::zero()), Money::zero());
        assert_eq!(principal.apply_rate(Rate::from_percent(100)), principal);
    }

    #[test]
    fn test_rate_rounding_half_away_from_zero() {
        // 0.825 -> 0.83
        assert_eq!(Money::from_cents(1000).apply_rate(Rate::from_bps(825)).cents(), 83);
        // 0.824 -> 0.82
        assert_eq!(Money::from_cents(1000).apply_rate(Rate::from_bps(824)).cents(), 82);
        assert_eq!(Money::from_cents(-1000).apply_rate(Rate::from_bps(825)).cents(), -83);
    }

    #[test]
    fn test_daily_rate_rounds_once() {
        // 333.33 × 0.1% × 3 = 0.99999 -> 1.00 (per-day rounding would give 0.99)
        let amount = Money::from_cents(33_333);
        assert_eq!(amount.apply_daily_rate(Rate::from_bps(10), 3).cents(), 100);
        assert_eq!(amount.apply_daily_rate(Rate::from_bps(10), 0), Money::zero());
        assert_eq!(amount.apply_daily_rate(Rate::from_bps(10), -4), Money::zero());
    }

    #[test]
    fn test_saturating_sub_and_min() {
        let a = Money::from_cents(300);
        let b = Money::from_cents(500);
        assert_eq!(a.saturating_sub(b), Money::zero());
        assert_eq!(b.saturating_sub(a).cents(), 200);
        assert_eq!(a.min(b), a);
    }

    #[test]
    fn test_ceil_div_covers_amount() {
        let total = Money::from_cents(1000);
        let share = total.ceil_div(3);
        assert_eq!(share.cents(), 334);
        assert!(share * 3 >= total);
        assert_eq!(total.ceil_div(0), total);
    }

    #[test]
    fn test_sum() {
        let total: Money = [200, -50, 125].iter().map(|c| Money::from_cents(*c)).sum();
        assert_eq!(total.cents(), 275);
    }

    #[test]
    fn test_day_counts() {
        let start = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        let due = add_days(start, 30);
        assert_eq!(due, NaiveDate::from_ymd_opt(2026, 2, 14).unwrap());
        assert_eq!(days_between(start, due), 30);
        assert_eq!(days_between(due, start), -30);
    }
}
