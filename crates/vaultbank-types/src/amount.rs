//! Minor-unit amounts
//!
//! Balances and transfer amounts are integer minor units (cents) in a single
//! implicit currency. Arithmetic is checked everywhere; parsing from decimal
//! strings is exact and rejects anything that cannot be represented in two
//! fractional digits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Minor units per whole currency unit (cents per dollar).
pub const MINOR_UNITS_PER_UNIT: i64 = 100;

/// Errors from parsing a decimal string into an [`Amount`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountParseError {
    #[error("amount is not a decimal number")]
    Malformed,

    #[error("amount has more than 2 decimal places")]
    TooPrecise,

    #[error("amount is out of range")]
    OutOfRange,
}

/// A signed monetary amount in minor units
///
/// Wraps an `i64` cent count. Negative values never appear on an account at
/// rest; they exist so that deltas and intermediate arithmetic are
/// well-defined.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Create an amount from a raw minor-unit count.
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// The raw minor-unit count.
    pub const fn minor(self) -> i64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Strictly greater than zero.
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }
}

impl FromStr for Amount {
    type Err = AmountParseError;

    /// Parse a decimal string ("40", "40.5", "-0.05") exactly.
    ///
    /// More than two fractional digits is an error even when the extra digits
    /// are zero; callers deal in minor units and nothing else.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let (units, fraction) = match digits.split_once('.') {
            Some((units, fraction)) => (units, fraction),
            None => (digits, ""),
        };

        if units.is_empty() && fraction.is_empty() {
            return Err(AmountParseError::Malformed);
        }
        if !units.chars().all(|c| c.is_ascii_digit())
            || !fraction.chars().all(|c| c.is_ascii_digit())
        {
            return Err(AmountParseError::Malformed);
        }
        if fraction.len() > 2 {
            return Err(AmountParseError::TooPrecise);
        }

        let units: i64 = if units.is_empty() {
            0
        } else {
            units.parse().map_err(|_| AmountParseError::OutOfRange)?
        };
        let mut cents: i64 = if fraction.is_empty() {
            0
        } else {
            // "5" means 50 cents, "05" means 5
            let parsed: i64 = fraction.parse().map_err(|_| AmountParseError::Malformed)?;
            if fraction.len() == 1 {
                parsed * 10
            } else {
                parsed
            }
        };
        if negative {
            cents = -cents;
        }

        units
            .checked_mul(if negative {
                -MINOR_UNITS_PER_UNIT
            } else {
                MINOR_UNITS_PER_UNIT
            })
            .and_then(|v| v.checked_add(cents))
            .map(Amount)
            .ok_or(AmountParseError::OutOfRange)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Widen before abs() so i64::MIN cannot overflow
        let value = self.0 as i128;
        let sign = if value < 0 { "-" } else { "" };
        let magnitude = value.abs();
        write!(
            f,
            "{}{}.{:02}",
            sign,
            magnitude / MINOR_UNITS_PER_UNIT as i128,
            magnitude % MINOR_UNITS_PER_UNIT as i128
        )
    }
}
