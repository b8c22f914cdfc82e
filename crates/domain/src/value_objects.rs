//! Value objects for the order domain.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier for a product (SKU).
///
/// Product identifiers come from the merchandising catalog and are
/// opaque strings, not UUIDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Creates a product ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ProductId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// ISO 4217 currency of a monetary amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
}

impl Currency {
    /// Returns the ISO 4217 code.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
        }
    }

    /// Parses an ISO 4217 code, case-insensitively.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "USD" => Some(Currency::Usd),
            "EUR" => Some(Currency::Eur),
            "GBP" => Some(Currency::Gbp),
            _ => None,
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors from monetary arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoneyError {
    /// Amounts in different currencies cannot be combined.
    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: Currency, right: Currency },

    /// The operation overflowed the minor-unit range.
    #[error("monetary amount overflow")]
    Overflow,
}

/// A monetary amount in minor units (cents) to avoid floating point issues.
///
/// All arithmetic is checked; combining amounts of different currencies
/// is an error rather than a silent coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    minor_units: i64,
    currency: Currency,
}

impl Money {
    /// Creates a monetary amount from minor units.
    pub fn new(minor_units: i64, currency: Currency) -> Self {
        Self {
            minor_units,
            currency,
        }
    }

    /// Zero in the given currency.
    pub fn zero(currency: Currency) -> Self {
        Self::new(0, currency)
    }

    /// Returns the amount in minor units.
    pub fn minor_units(&self) -> i64 {
        self.minor_units
    }

    /// Returns the currency.
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Adds two amounts of the same currency.
    pub fn checked_add(&self, other: Money) -> Result<Money, MoneyError> {
        self.require_same_currency(other)?;
        let minor_units = self
            .minor_units
            .checked_add(other.minor_units)
            .ok_or(MoneyError::Overflow)?;
        Ok(Money::new(minor_units, self.currency))
    }

    /// Subtracts an amount of the same currency.
    pub fn checked_sub(&self, other: Money) -> Result<Money, MoneyError> {
        self.require_same_currency(other)?;
        let minor_units = self
            .minor_units
            .checked_sub(other.minor_units)
            .ok_or(MoneyError::Overflow)?;
        Ok(Money::new(minor_units, self.currency))
    }

    /// Multiplies the amount by an order quantity.
    pub fn multiply(&self, quantity: Quantity) -> Result<Money, MoneyError> {
        let minor_units = self
            .minor_units
            .checked_mul(i64::from(quantity.get()))
            .ok_or(MoneyError::Overflow)?;
        Ok(Money::new(minor_units, self.currency))
    }

    /// Returns true if the amount is strictly positive.
    pub fn is_positive(&self) -> bool {
        self.minor_units > 0
    }

    fn require_same_currency(&self, other: Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency,
                right: other.currency,
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.minor_units < 0 { "-" } else { "" };
        let abs = self.minor_units.unsigned_abs();
        write!(f, "{sign}{}.{:02} {}", abs / 100, abs % 100, self.currency)
    }
}

/// The quantity requested by an order; always a positive integer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Quantity(u32);

/// The requested quantity was zero or otherwise unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid quantity {value}: must be a positive integer")]
pub struct InvalidQuantity {
    pub value: u32,
}

impl Quantity {
    /// Validates and wraps an order quantity.
    pub fn new(value: u32) -> Result<Self, InvalidQuantity> {
        if value == 0 {
            return Err(InvalidQuantity { value });
        }
        Ok(Self(value))
    }

    /// Returns the raw quantity.
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for Quantity {
    type Error = InvalidQuantity;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_addition_same_currency() {
        let a = Money::new(1000, Currency::Usd);
        let b = Money::new(500, Currency::Usd);
        assert_eq!(a.checked_add(b).unwrap(), Money::new(1500, Currency::Usd));
    }

    #[test]
    fn money_addition_different_currency_fails() {
        let a = Money::new(1000, Currency::Usd);
        let b = Money::new(500, Currency::Eur);
        assert_eq!(
            a.checked_add(b),
            Err(MoneyError::CurrencyMismatch {
                left: Currency::Usd,
                right: Currency::Eur,
            })
        );
    }

    #[test]
    fn money_multiply_by_quantity() {
        let price = Money::new(2999, Currency::Usd);
        let quantity = Quantity::new(3).unwrap();
        assert_eq!(
            price.multiply(quantity).unwrap(),
            Money::new(8997, Currency::Usd)
        );
    }

    #[test]
    fn money_overflow_is_detected() {
        let a = Money::new(i64::MAX, Currency::Usd);
        let b = Money::new(1, Currency::Usd);
        assert_eq!(a.checked_add(b), Err(MoneyError::Overflow));

        let quantity = Quantity::new(2).unwrap();
        assert_eq!(a.multiply(quantity), Err(MoneyError::Overflow));
    }

    #[test]
    fn money_display_in_major_units() {
        assert_eq!(Money::new(12345, Currency::Usd).to_string(), "123.45 USD");
        assert_eq!(Money::new(-5, Currency::Gbp).to_string(), "-0.05 GBP");
        assert_eq!(Money::zero(Currency::Eur).to_string(), "0.00 EUR");
    }

    #[test]
    fn currency_code_roundtrip() {
        for currency in [Currency::Usd, Currency::Eur, Currency::Gbp] {
            assert_eq!(Currency::from_code(currency.code()), Some(currency));
        }
        assert_eq!(Currency::from_code("usd"), Some(Currency::Usd));
        assert_eq!(Currency::from_code("XXX"), None);
    }

    #[test]
    fn quantity_rejects_zero() {
        assert!(Quantity::new(0).is_err());
        assert_eq!(Quantity::new(1).unwrap().get(), 1);
    }

    #[test]
    fn quantity_serializes_as_bare_number() {
        let q = Quantity::new(7).unwrap();
        assert_eq!(serde_json::to_string(&q).unwrap(), "7");
    }

    #[test]
    fn product_id_display() {
        let id = ProductId::new("SKU-001");
        assert_eq!(id.to_string(), "SKU-001");
        assert_eq!(id.as_str(), "SKU-001");
    }
}
