//! Fixed-point monetary amounts.
//!
//! Amounts are unsigned integers counted in the smallest unit, with
//! [`AMOUNT_DECIMAL_PLACES`] decimal places. Decimal strings exist only at the
//! boundary: [`Amount::from_str`] parses them and `Display` renders them with
//! trailing zeros trimmed (`"69"`, `"1.5"`, `"0"`).

use crate::error::ChainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::str::FromStr;

pub const AMOUNT_DECIMAL_PLACES: usize = 9;

/// Number of base units in one whole coin.
pub const UNITS_PER_COIN: u64 = 1_000_000_000;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_units(units: u64) -> Self {
        Amount(units)
    }

    /// Whole coins; returns `None` on overflow.
    pub fn from_coins(coins: u64) -> Option<Self> {
        coins.checked_mul(UNITS_PER_COIN).map(Amount)
    }

    pub const fn units(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Amount)
    }

    pub fn saturating_sub(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_sub(rhs.0))
    }

    pub fn to_le_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

fn format_units(units: u128, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let scale = UNITS_PER_COIN as u128;
    let whole = units / scale;
    let frac = units % scale;
    if frac == 0 {
        return write!(f, "{}", whole);
    }
    let digits = format!("{:0width$}", frac, width = AMOUNT_DECIMAL_PLACES);
    write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        format_units(self.0 as u128, f)
    }
}

impl FromStr for Amount {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = |reason: &str| {
            ChainError::ValidationError(format!("Invalid amount '{}': {}", s, reason))
        };

        if s.is_empty() {
            return Err(invalid("empty"));
        }
        if s.starts_with('-') {
            return Err(invalid("must not be negative"));
        }

        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid("no digits"));
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid("not a decimal number"));
        }
        if frac.len() > AMOUNT_DECIMAL_PLACES {
            return Err(invalid("too many decimal places"));
        }

        let whole_units = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<u64>()
                .ok()
                .and_then(|w| w.checked_mul(UNITS_PER_COIN))
                .ok_or_else(|| invalid("out of range"))?
        };
        let frac_units = if frac.is_empty() {
            0
        } else {
            let padded = format!("{:0<width$}", frac, width = AMOUNT_DECIMAL_PLACES);
            padded.parse::<u64>().map_err(|_| invalid("not a decimal number"))?
        };

        whole_units
            .checked_add(frac_units)
            .map(Amount)
            .ok_or_else(|| invalid("out of range"))
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, a| Amount(acc.0.saturating_add(a.0)))
    }
}

/// A balance that may dip below zero in the optimistic pending view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignedAmount(i128);

impl SignedAmount {
    pub const ZERO: SignedAmount = SignedAmount(0);

    pub const fn from_units(units: i128) -> Self {
        SignedAmount(units)
    }

    pub const fn units(self) -> i128 {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn add_amount(self, amount: Amount) -> Self {
        SignedAmount(self.0 + amount.units() as i128)
    }

    pub fn sub_amount(self, amount: Amount) -> Self {
        SignedAmount(self.0 - amount.units() as i128)
    }
}

impl From<Amount> for SignedAmount {
    fn from(amount: Amount) -> Self {
        SignedAmount(amount.units() as i128)
    }
}

impl std::ops::Add for SignedAmount {
    type Output = SignedAmount;

    fn add(self, rhs: SignedAmount) -> SignedAmount {
        SignedAmount(self.0 + rhs.0)
    }
}

impl fmt::Display for SignedAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 < 0 {
            write!(f, "-")?;
        }
        format_units(self.0.unsigned_abs(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amt(s: &str) -> Amount {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_whole_and_fractional() {
        assert_eq!(amt("30"), Amount::from_units(30 * UNITS_PER_COIN));
        assert_eq!(amt("1.5"), Amount::from_units(1_500_000_000));
        assert_eq!(amt(".25"), Amount::from_units(250_000_000));
        assert_eq!(amt("0.000000001"), Amount::from_units(1));
        assert_eq!(amt("0"), Amount::ZERO);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        for bad in ["", "-1", "abc", "1.2.3", ".", "1e5", "0.0000000001", "18446744074"] {
            let result = bad.parse::<Amount>();
            assert!(
                matches!(result, Err(ChainError::ValidationError(_))),
                "expected rejection for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_display_trims_trailing_zeros() {
        assert_eq!(amt("69").to_string(), "69");
        assert_eq!(amt("1.50").to_string(), "1.5");
        assert_eq!(Amount::ZERO.to_string(), "0");
        assert_eq!(Amount::from_units(1).to_string(), "0.000000001");
    }

    #[test]
    fn test_signed_amount_display() {
        let balance = SignedAmount::from(amt("10")).sub_amount(amt("12.5"));
        assert!(balance.is_negative());
        assert_eq!(balance.to_string(), "-2.5");
        assert_eq!(SignedAmount::ZERO.to_string(), "0");
    }

    #[test]
    fn test_checked_arithmetic() {
        assert_eq!(amt("1").checked_sub(amt("2")), None);
        assert_eq!(amt("30").checked_add(amt("1")), Some(amt("31")));
        assert_eq!(Amount::from_units(u64::MAX).checked_add(amt("1")), None);
        assert_eq!(amt("5").saturating_sub(amt("7")), Amount::ZERO);
    }
}
