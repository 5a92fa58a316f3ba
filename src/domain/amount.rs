//! Amount type
//!
//! Domain primitive for ledger amounts. Every ledger entry carries a strictly
//! positive value; the direction of the movement lives in the entry kind.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum allowed amount (1 trillion, 0xE8_D4A5_1000)
const MAX_AMOUNT: Decimal = Decimal::from_parts(0xD4A5_1000, 0xE8, 0, false, 0);

/// Maximum decimal places (4)
const MAX_SCALE: u32 = 4;

/// Amount represents a validated monetary value.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - Maximum 4 decimal places
/// - Maximum value is 1 trillion
///
/// # Example
/// ```
/// use rust_decimal::Decimal;
/// use ledger_reconcile::domain::Amount;
///
/// let amount = Amount::new(Decimal::new(500000, 0)).unwrap();
/// assert_eq!(amount.value(), Decimal::new(500000, 0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

/// Errors that can occur when creating an Amount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(Decimal),

    #[error("Amount has too many decimal places (max {MAX_SCALE}, got {0})")]
    TooManyDecimals(u32),

    #[error("Amount exceeds maximum allowed value ({MAX_AMOUNT})")]
    Overflow,

    #[error("Invalid amount format: {0}")]
    ParseError(String),
}

impl Amount {
    /// Create a new Amount with validation.
    ///
    /// Trailing fractional zeros are stripped first, so `500000.00` is
    /// accepted and stored as `500000`.
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        let value = value.normalize();

        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive(value));
        }

        if value.scale() > MAX_SCALE {
            return Err(AmountError::TooManyDecimals(value.scale()));
        }

        if value > MAX_AMOUNT {
            return Err(AmountError::Overflow);
        }

        Ok(Self(value))
    }

    /// Create an Amount from an integer (no decimal places).
    pub fn from_integer(value: i64) -> Result<Self, AmountError> {
        Self::new(Decimal::from(value))
    }

    /// Get the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Value rounded to a whole unit, half away from zero.
    ///
    /// Duplicate detection compares whole units so that `499999.6` and
    /// `500000` re-entered by hand collapse to the same key.
    pub fn rounded(&self) -> Decimal {
        self.0
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .normalize()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal = Decimal::from_str(s.trim())
            .map_err(|e| AmountError::ParseError(e.to_string()))?;
        Amount::new(decimal)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_positive() {
        let amount = Amount::new(Decimal::new(500000, 0)).unwrap();
        assert_eq!(amount.value(), Decimal::new(500000, 0));
    }

    #[test]
    fn test_amount_zero_rejected() {
        let amount = Amount::new(Decimal::ZERO);
        assert!(matches!(amount, Err(AmountError::NotPositive(_))));
    }

    #[test]
    fn test_amount_negative_rejected() {
        let amount = Amount::new(Decimal::new(-100, 0));
        assert!(matches!(amount, Err(AmountError::NotPositive(_))));
    }

    #[test]
    fn test_amount_trailing_zeros_normalized() {
        // 500000.0000000 would exceed the scale limit if not normalized
        let amount = Amount::new(Decimal::new(5_000_000_000_000, 7)).unwrap();
        assert_eq!(amount.value().scale(), 0);
        assert_eq!(amount.to_string(), "500000");
    }

    #[test]
    fn test_amount_too_many_decimals() {
        let amount = Amount::new(Decimal::new(123456, 5));
        assert!(matches!(amount, Err(AmountError::TooManyDecimals(5))));
    }

    #[test]
    fn test_amount_overflow() {
        let value = Decimal::from_str("1000000000001").unwrap();
        assert!(matches!(Amount::new(value), Err(AmountError::Overflow)));

        let max = Decimal::from_str("1000000000000").unwrap();
        assert_eq!(MAX_AMOUNT, max);
        assert!(Amount::new(max).is_ok());
        assert_eq!(
            AmountError::Overflow.to_string(),
            "Amount exceeds maximum allowed value (1000000000000)"
        );
    }

    #[test]
    fn test_amount_rounded() {
        let amount: Amount = "499999.5".parse().unwrap();
        assert_eq!(amount.rounded(), Decimal::new(500000, 0));

        let amount: Amount = "1250.49".parse().unwrap();
        assert_eq!(amount.rounded().to_string(), "1250");
    }

    #[test]
    fn test_amount_from_str_invalid() {
        let amount: Result<Amount, _> = "abc".parse();
        assert!(matches!(amount, Err(AmountError::ParseError(_))));
    }
}
