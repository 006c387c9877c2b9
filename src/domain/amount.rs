//! Amount type
//!
//! Domain primitives for monetary values. Everything inside the ledger is an
//! integer count of minor units (cents). Callers supply floating-point major
//! units; the conversion happens exactly once, in [`Amount::from_major`].

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minor units per major unit
pub const MINOR_PER_MAJOR: i64 = 100;

/// Maximum amount accepted for a single posting (1 trillion major units)
const MAX_AMOUNT_MINOR: i64 = 1_000_000_000_000 * MINOR_PER_MAJOR;

/// Amount represents a validated, strictly positive posting amount in minor units.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - Value never exceeds 1 trillion major units
///
/// # Example
/// ```
/// use ledger_service::domain::Amount;
///
/// let amount = Amount::from_major(12.34).unwrap();
/// assert_eq!(amount.minor_units(), 1234);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

/// Errors that can occur when creating an Amount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be a finite number")]
    NotFinite,

    #[error("Amount must be positive (got {0})")]
    NotPositive(Decimal),

    #[error("Amount has more precision than one minor unit (got {0})")]
    TooPrecise(Decimal),

    #[error("Amount exceeds maximum allowed value")]
    Overflow,
}

impl Amount {
    /// Convert a major-unit amount (e.g. dollars) into minor units.
    ///
    /// # Errors
    /// - `AmountError::NotFinite` for NaN or infinity
    /// - `AmountError::NotPositive` if value <= 0
    /// - `AmountError::TooPrecise` for fractions of a minor unit
    /// - `AmountError::Overflow` above 1 trillion major units
    pub fn from_major(major: f64) -> Result<Self, AmountError> {
        if !major.is_finite() {
            return Err(AmountError::NotFinite);
        }

        let major = Decimal::from_f64(major).ok_or(AmountError::Overflow)?;
        if major <= Decimal::ZERO {
            return Err(AmountError::NotPositive(major));
        }

        let scaled = major
            .checked_mul(Decimal::from(MINOR_PER_MAJOR))
            .ok_or(AmountError::Overflow)?;
        let rounded = scaled.round();

        // Tolerate binary float noise, not real sub-cent input.
        if (scaled - rounded).abs() > Decimal::new(1, 6) {
            return Err(AmountError::TooPrecise(major));
        }

        let minor = rounded.to_i64().ok_or(AmountError::Overflow)?;
        Self::from_minor(minor)
    }

    /// Create an Amount from minor units.
    pub fn from_minor(minor: i64) -> Result<Self, AmountError> {
        if minor <= 0 {
            return Err(AmountError::NotPositive(Decimal::new(minor, 2)));
        }
        if minor > MAX_AMOUNT_MINOR {
            return Err(AmountError::Overflow);
        }
        Ok(Self(minor))
    }

    pub fn minor_units(&self) -> i64 {
        self.0
    }

    /// Value in major units, for display.
    pub fn to_major(&self) -> Decimal {
        Decimal::new(self.0, 2)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_major())
    }
}

impl TryFrom<i64> for Amount {
    type Error = AmountError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Amount::from_minor(value)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Balance of an account in minor units.
///
/// Computed as credits minus debits, so it may be negative (external
/// accounts go negative when they fund deposits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Balance(i64);

impl Balance {
    pub fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn minor_units(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Check if balance covers a debit of `amount`
    pub fn is_sufficient_for(&self, amount: &Amount) -> bool {
        self.0 >= amount.minor_units()
    }

    /// Balance in major units.
    ///
    /// A true zero is returned as plain `0` rather than `0.00`.
    pub fn to_major(&self) -> Decimal {
        if self.is_zero() {
            return Decimal::ZERO;
        }
        Decimal::new(self.0, 2)
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_major())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_from_major_whole_units() {
        let amount = Amount::from_major(100.0).unwrap();
        assert_eq!(amount.minor_units(), 10_000);
    }

    #[test]
    fn test_from_major_cents() {
        assert_eq!(Amount::from_major(12.34).unwrap().minor_units(), 1234);
        assert_eq!(Amount::from_major(0.01).unwrap().minor_units(), 1);
        // 0.1 + 0.2 is not exactly 0.3 in binary floating point
        assert_eq!(Amount::from_major(0.1 + 0.2).unwrap().minor_units(), 30);
    }

    #[test]
    fn test_from_major_zero_rejected() {
        assert!(matches!(Amount::from_major(0.0), Err(AmountError::NotPositive(_))));
    }

    #[test]
    fn test_from_major_negative_rejected() {
        assert!(matches!(Amount::from_major(-5.0), Err(AmountError::NotPositive(_))));
    }

    #[test]
    fn test_from_major_non_finite_rejected() {
        assert_eq!(Amount::from_major(f64::NAN), Err(AmountError::NotFinite));
        assert_eq!(Amount::from_major(f64::INFINITY), Err(AmountError::NotFinite));
    }

    #[test]
    fn test_from_major_sub_cent_rejected() {
        assert!(matches!(Amount::from_major(10.005), Err(AmountError::TooPrecise(_))));
    }

    #[test]
    fn test_from_major_overflow() {
        assert_eq!(Amount::from_major(1e13), Err(AmountError::Overflow));
        assert!(Amount::from_major(1e12).is_ok());
    }

    #[test]
    fn test_from_minor() {
        assert!(Amount::from_minor(1).is_ok());
        assert!(matches!(Amount::from_minor(0), Err(AmountError::NotPositive(_))));
    }

    #[test]
    fn test_amount_to_major() {
        let amount = Amount::from_minor(70_050).unwrap();
        assert_eq!(amount.to_major(), dec!(700.50));
        assert_eq!(amount.to_string(), "700.50");
    }

    #[test]
    fn test_balance_sufficiency() {
        let amount = Amount::from_minor(500).unwrap();

        assert!(Balance::from_minor(500).is_sufficient_for(&amount));
        assert!(Balance::from_minor(501).is_sufficient_for(&amount));
        assert!(!Balance::from_minor(499).is_sufficient_for(&amount));
        assert!(!Balance::from_minor(-10).is_sufficient_for(&amount));
    }

    #[test]
    fn test_balance_to_major() {
        assert_eq!(Balance::from_minor(12_345).to_major(), dec!(123.45));
        assert_eq!(Balance::from_minor(-250).to_major(), dec!(-2.50));
        // 5 cents is not truncated to zero
        assert_eq!(Balance::from_minor(5).to_major(), dec!(0.05));
    }

    #[test]
    fn test_balance_zero_is_plain_zero() {
        let zero = Balance::zero();
        assert!(zero.is_zero());
        assert_eq!(zero.to_major().to_string(), "0");
        assert_eq!(Balance::from_minor(100).to_major().to_string(), "1.00");
    }
}
