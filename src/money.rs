//! Conversions between decimal amounts and the integer cents stored in the database.
//!
//! Amounts are handled as [Decimal] in the application and stored as whole
//! cents so that SQL aggregates are exact.

use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};

use crate::Error;

/// The currency used when none is specified.
pub const DEFAULT_CURRENCY: &str = "USD";

/// The largest amount accepted for a single record.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Convert `amount` to whole cents, rounding half away from zero.
///
/// Amounts outside the range of an `i64` saturate.
pub fn to_cents(amount: Decimal) -> i64 {
    let cents = (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);

    cents.to_i64().unwrap_or(if cents.is_sign_negative() {
        i64::MIN
    } else {
        i64::MAX
    })
}

/// Convert whole cents to a decimal amount with two decimal places.
pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Round `amount` to two decimal places.
pub fn round_money(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

/// Check that `amount` is strictly positive and not absurdly large.
///
/// # Errors
/// Returns [Error::InvalidAmount] otherwise.
pub fn validate_positive_amount(amount: Decimal) -> Result<Decimal, Error> {
    if amount <= Decimal::ZERO || amount > MAX_AMOUNT {
        return Err(Error::InvalidAmount(amount));
    }

    Ok(round_money(amount))
}

/// Normalise a currency code to upper case and check it is three ASCII letters.
///
/// # Errors
/// Returns [Error::InvalidCurrency] if the code is malformed.
pub fn validate_currency(code: &str) -> Result<String, Error> {
    let code = code.trim();

    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(Error::InvalidCurrency(code.to_owned()));
    }

    Ok(code.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use crate::Error;

    use super::{from_cents, round_money, to_cents, validate_currency, validate_positive_amount};

    #[test]
    fn converts_to_cents_rounding_half_away_from_zero() {
        assert_eq!(to_cents(Decimal::from_str("12.345").unwrap()), 1235);
        assert_eq!(to_cents(Decimal::from_str("-12.345").unwrap()), -1235);
        assert_eq!(to_cents(Decimal::from_str("0.1").unwrap()), 10);
    }

    #[test]
    fn from_cents_has_two_decimal_places() {
        let amount = from_cents(1250);

        assert_eq!(amount.to_string(), "12.50");
    }

    #[test]
    fn round_money_pads_to_two_places() {
        assert_eq!(round_money(Decimal::from(3)).to_string(), "3.00");
    }

    #[test]
    fn rejects_zero_and_negative_amounts() {
        assert_eq!(
            validate_positive_amount(Decimal::ZERO),
            Err(Error::InvalidAmount(Decimal::ZERO))
        );
        assert!(validate_positive_amount(Decimal::from(-5)).is_err());
        assert!(validate_positive_amount(Decimal::from(5)).is_ok());
    }

    #[test]
    fn currency_is_upper_cased() {
        assert_eq!(validate_currency("nzd"), Ok("NZD".to_owned()));
    }

    #[test]
    fn currency_must_be_three_letters() {
        assert_eq!(
            validate_currency("DOLLARS"),
            Err(Error::InvalidCurrency("DOLLARS".to_owned()))
        );
        assert!(validate_currency("U5D").is_err());
    }
}
