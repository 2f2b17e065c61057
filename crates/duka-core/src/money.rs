//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  Cash 700.10 + M-Pesa 499.90 as f64 = 1199.9999999999998  ❌            │
//! │  → "PartiallyPaid" on a sale of 1200.00 that is fully settled          │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    70010 + 49990 = 120000 cents  ✅ Paid                                │
//! │                                                                         │
//! │  Provider amounts arrive as JSON numbers; we parse their DECIMAL TEXT, │
//! │  never the f64 value.                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use duka_core::money::Money;
//!
//! let cash = Money::from_major(700);
//! let mpesa = Money::parse_decimal("500").unwrap();
//! assert_eq!((cash + mpesa).cents(), 120_000);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents of a shilling).
///
/// ## Design Decisions
/// - **i64 (signed)**: subtraction can go negative before clamping
///   (e.g. `total_paid - total` when computing change)
/// - **Single field tuple struct**: zero-cost, serializes as a bare integer
///
/// ## Where Money Flows
/// ```text
/// PaymentRequest.amount ──► callback Amount ──► Sale.mpesa ──┐
///                                                           ├─► total paid ─► change
/// Sale.cash ────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents (the smallest currency unit).
    ///
    /// ```rust
    /// use duka_core::money::Money;
    ///
    /// let price = Money::from_cents(1099); // KES 10.99
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from whole shillings.
    #[inline]
    pub const fn from_major(major: i64) -> Self {
        Money(major * 100)
    }

    /// Parses a decimal string such as `"500"`, `"500.0"` or `"12.5"`.
    ///
    /// ## Rules
    /// - Optional leading sign
    /// - At most two significant fractional digits (`"1.500"` is fine,
    ///   `"1.505"` is not)
    /// - No exponent notation
    ///
    /// ```rust
    /// use duka_core::money::Money;
    ///
    /// assert_eq!(Money::parse_decimal("12.5").unwrap().cents(), 1250);
    /// assert!(Money::parse_decimal("12.505").is_err());
    /// ```
    pub fn parse_decimal(text: &str) -> CoreResult<Money> {
        let raw = text.trim();
        let invalid = |reason: &str| CoreError::invalid_amount(raw, reason);

        let (negative, unsigned) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw.strip_prefix('+').unwrap_or(raw)),
        };

        let (major_str, fraction_str) = unsigned.split_once('.').unwrap_or((unsigned, ""));
        let fraction_str = fraction_str.trim_end_matches('0');

        if major_str.is_empty() && fraction_str.is_empty() {
            return Err(invalid("not a decimal number"));
        }

        let is_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
        if !is_digits(major_str) || !is_digits(fraction_str) {
            return Err(invalid("not a decimal number"));
        }

        if fraction_str.len() > 2 {
            return Err(invalid("more than two decimal places"));
        }

        let major: i64 = if major_str.is_empty() {
            0
        } else {
            major_str.parse().map_err(|_| invalid("out of range"))?
        };

        // "5" → 50 cents, "05" → 5 cents, "" → 0
        let minor: i64 = format!("{:0<2}", fraction_str)
            .parse()
            .map_err(|_| invalid("not a decimal number"))?;

        let cents = major
            .checked_mul(100)
            .and_then(|c| c.checked_add(minor))
            .ok_or_else(|| invalid("out of range"))?;

        Ok(Money(if negative { -cents } else { cents }))
    }

    /// Converts a JSON value from the provider into Money.
    ///
    /// Accepts numbers (`500`, `500.0`) and numeric strings (`"500"`).
    /// The number's textual form is parsed so no float rounding is involved.
    pub fn from_json(value: &serde_json::Value) -> CoreResult<Money> {
        match value {
            serde_json::Value::Number(n) => Money::parse_decimal(&n.to_string()),
            serde_json::Value::String(s) => Money::parse_decimal(s),
            other => Err(CoreError::invalid_amount(other, "expected a number")),
        }
    }

    /// Returns the value in cents (smallest currency unit).
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the whole-shilling portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the cents portion (always 0-99).
    #[inline]
    pub const fn minor_part(&self) -> i64 {
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

    /// Sum, or `None` if it leaves the i64 range.
    #[inline]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Difference, or `None` if it leaves the i64 range.
    #[inline]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        match self.0.checked_sub(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    #[inline]
    pub const fn saturating_add(self, other: Self) -> Self {
        Money(self.0.saturating_add(other.0))
    }

    /// Clamps negative values to zero.
    ///
    /// ```rust
    /// use duka_core::money::Money;
    ///
    /// let shortfall = Money::from_cents(300) - Money::from_cents(500);
    /// assert_eq!(shortfall.clamp_non_negative(), Money::zero());
    /// ```
    #[inline]
    pub const fn clamp_non_negative(&self) -> Self {
        if self.0 < 0 {
            Money(0)
        } else {
            *self
        }
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display is for logs. Frontends localise their own formatting.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{}KES {}.{:02}",
            sign,
            self.major().abs(),
            self.minor_part()
        )
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

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
