//! Currency-tagged monetary amounts
//!
//! Item amounts are strictly positive by construction. Base-currency
//! conversion is a pure helper over an explicit rate table - the engine
//! never fetches rates itself.

use crate::error::{EngineError, EngineResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Supported invoice currencies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    /// Euro
    Eur,
    /// US dollar
    Usd,
    /// Pound sterling
    Gbp,
    /// Swiss franc
    Chf,
}

impl Currency {
    /// ISO 4217 code
    #[inline]
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Eur => "EUR",
            Self::Usd => "USD",
            Self::Gbp => "GBP",
            Self::Chf => "CHF",
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A strictly-positive amount in a specific currency
///
/// # Invariants
/// - `amount > 0` (validated at construction)
/// - Immutable after construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    /// Create a new amount
    ///
    /// # Errors
    /// Returns `EngineError::Validation` if `amount` is zero or negative.
    pub fn new(amount: Decimal, currency: Currency) -> EngineResult<Self> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::validation(format!(
                "monetary amount must be strictly positive, got {amount} {currency}"
            )));
        }
        Ok(Self { amount, currency })
    }

    /// The numeric amount
    #[inline]
    #[must_use]
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// The tagged currency
    #[inline]
    #[must_use]
    pub fn currency(&self) -> Currency {
        self.currency
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

/// Explicit conversion rates into one base currency
///
/// Rates are reference data owned by a collaborator; callers pass a table
/// into the pure conversion helper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateTable {
    base: Currency,
    rates: HashMap<Currency, Decimal>,
}

impl RateTable {
    /// Create a table converting into `base`
    #[inline]
    #[must_use]
    pub fn new(base: Currency) -> Self {
        Self {
            base,
            rates: HashMap::new(),
        }
    }

    /// Register a rate (1 unit of `currency` = `rate` units of base)
    #[must_use]
    pub fn with_rate(mut self, currency: Currency, rate: Decimal) -> Self {
        self.rates.insert(currency, rate);
        self
    }

    /// The base currency
    #[inline]
    #[must_use]
    pub fn base(&self) -> Currency {
        self.base
    }

    /// Convert an amount into the base currency
    ///
    /// # Errors
    /// Returns `EngineError::Validation` if no rate is registered for the
    /// amount's currency, or if the registered rate is negative.
    pub fn to_base(&self, money: Money) -> EngineResult<Decimal> {
        if money.currency() == self.base {
            return Ok(money.amount());
        }
        let rate = self.rates.get(&money.currency()).ok_or_else(|| {
            EngineError::validation(format!(
                "no conversion rate registered for {}",
                money.currency()
            ))
        })?;
        if rate.is_sign_negative() {
            return Err(EngineError::validation(format!(
                "conversion rate for {} is negative",
                money.currency()
            )));
        }
        Ok(money.amount() * *rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_amount_accepted() {
        let m = Money::new(Decimal::new(150_000, 2), Currency::Eur).unwrap();
        assert_eq!(m.amount(), Decimal::new(150_000, 2));
        assert_eq!(m.currency(), Currency::Eur);
    }

    #[test]
    fn zero_and_negative_amounts_rejected() {
        assert!(Money::new(Decimal::ZERO, Currency::Eur).is_err());
        assert!(Money::new(Decimal::new(-1, 0), Currency::Usd).is_err());
    }

    #[test]
    fn base_conversion_is_identity_for_base_currency() {
        let table = RateTable::new(Currency::Eur);
        let m = Money::new(Decimal::new(100, 0), Currency::Eur).unwrap();
        assert_eq!(table.to_base(m).unwrap(), Decimal::new(100, 0));
    }

    #[test]
    fn base_conversion_applies_registered_rate() {
        let table = RateTable::new(Currency::Eur).with_rate(Currency::Usd, Decimal::new(92, 2));
        let m = Money::new(Decimal::new(200, 0), Currency::Usd).unwrap();
        assert_eq!(table.to_base(m).unwrap(), Decimal::new(184, 0));
    }

    #[test]
    fn missing_rate_is_a_validation_error() {
        let table = RateTable::new(Currency::Eur);
        let m = Money::new(Decimal::new(10, 0), Currency::Gbp).unwrap();
        assert!(table.to_base(m).is_err());
    }
}
