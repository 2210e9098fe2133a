use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minor units per major unit (cents per euro).
pub const MINOR_PER_MAJOR: u64 = 100;

/// Exact monetary amount, stored in minor currency units.
///
/// Always rendered with exactly two fractional digits, so `"15"` parses to an
/// amount that displays as `"15.00"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u64);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("amount '{0}' is not a decimal number")]
    NotDecimal(String),
    #[error("amount '{0}' has more than two fractional digits")]
    TooPrecise(String),
    #[error("amount must be greater than zero")]
    NotPositive,
    #[error("amount is too large")]
    Overflow,
}

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_minor(minor: u64) -> Self {
        Amount(minor)
    }

    pub const fn minor_units(self) -> u64 {
        self.0
    }

    /// Parse a user-entered amount: digits, optionally followed by a dot and
    /// one or two fractional digits. Zero is rejected.
    pub fn parse(input: &str) -> Result<Self, AmountError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(AmountError::Empty);
        }
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, Some(f)),
            None => (s, None),
        };
        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AmountError::NotDecimal(s.to_string()));
        }
        let frac_minor = match frac {
            None => 0,
            Some(f) if f.is_empty() || !f.bytes().all(|b| b.is_ascii_digit()) => {
                return Err(AmountError::NotDecimal(s.to_string()));
            }
            Some(f) if f.len() > 2 => return Err(AmountError::TooPrecise(s.to_string())),
            Some(f) => {
                let digits: u64 = f.parse().map_err(|_| AmountError::NotDecimal(s.to_string()))?;
                if f.len() == 1 {
                    digits * 10
                } else {
                    digits
                }
            }
        };
        let whole: u64 = whole.parse().map_err(|_| AmountError::Overflow)?;
        let minor = whole
            .checked_mul(MINOR_PER_MAJOR)
            .and_then(|m| m.checked_add(frac_minor))
            .ok_or(AmountError::Overflow)?;
        if minor == 0 {
            return Err(AmountError::NotPositive);
        }
        Ok(Amount(minor))
    }

    /// `self * quantity`, or `None` on overflow.
    pub fn checked_mul(self, quantity: u32) -> Option<Amount> {
        self.0.checked_mul(u64::from(quantity)).map(Amount)
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / MINOR_PER_MAJOR, self.0 % MINOR_PER_MAJOR)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Amount::parse(s)
    }
}

// Amounts travel as fixed two-decimal strings ("31.50"), never as floats.
impl Serialize for Amount {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let s = raw.trim();
        // Zero is a valid stored value (e.g. an empty order), only user input must be positive.
        if s.bytes().all(|b| b == b'0' || b == b'.') && s.bytes().any(|b| b == b'0') {
            return Ok(Amount::ZERO);
        }
        Amount::parse(s).map_err(serde::de::Error::custom)
    }
}
