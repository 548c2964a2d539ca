//! Conversion between raw on-chain integers and decimal token units.

use super::GatewayError;
use crate::domain::Decimal;
use alloy::primitives::utils::{format_units, parse_units};
use alloy::primitives::U256;
use rust_decimal::Decimal as RustDecimal;
use std::str::FromStr;

/// Decimals of Liquidity Book LP tokens.
pub const LP_DECIMALS: u8 = 18;

/// Digits rust_decimal can hold.
const MAX_SIGNIFICANT_DIGITS: usize = 28;

/// Raw integer amount to token units.
///
/// Fractional digits beyond what the decimal type can hold are truncated.
pub fn to_decimal(raw: U256, decimals: u8) -> Result<Decimal, GatewayError> {
    let formatted = format_units(raw, decimals).map_err(|e| GatewayError::Decode(e.to_string()))?;
    parse_truncating(&formatted)
}

/// Token units to a raw integer amount, truncating below the token's precision.
pub fn to_raw(amount: Decimal, decimals: u8) -> Result<U256, GatewayError> {
    if amount.is_negative() {
        return Err(GatewayError::Decode(format!(
            "negative amount {} cannot be sent on-chain",
            amount
        )));
    }
    let text = amount.truncate_to(u32::from(decimals)).to_canonical_string();
    parse_units(&text, decimals)
        .map(|parsed| parsed.get_absolute())
        .map_err(|e| GatewayError::Decode(e.to_string()))
}

fn parse_truncating(formatted: &str) -> Result<Decimal, GatewayError> {
    let (int_part, frac_part) = formatted.split_once('.').unwrap_or((formatted, ""));
    let int_digits = int_part.trim_start_matches('0').len();
    if int_digits > MAX_SIGNIFICANT_DIGITS {
        return Err(GatewayError::Decode(format!(
            "amount {} exceeds decimal range",
            formatted
        )));
    }
    let keep = frac_part
        .len()
        .min(MAX_SIGNIFICANT_DIGITS.saturating_sub(int_digits.max(1)));
    let candidate = if keep == 0 {
        int_part.to_string()
    } else {
        format!("{}.{}", int_part, &frac_part[..keep])
    };
    RustDecimal::from_str(&candidate)
        .map(Decimal::new)
        .map_err(|e| GatewayError::Decode(format!("{}: {}", candidate, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_to_decimal_eighteen_decimals() {
        let raw = U256::from(1_500_000_000_000_000_000u128);
        assert_eq!(to_decimal(raw, 18).unwrap(), d("1.5"));
    }

    #[test]
    fn test_to_decimal_eight_decimals() {
        let raw = U256::from(12_345u64);
        assert_eq!(to_decimal(raw, 8).unwrap(), d("0.00012345"));
    }

    #[test]
    fn test_to_decimal_zero() {
        assert!(to_decimal(U256::ZERO, 18).unwrap().is_zero());
    }

    #[test]
    fn test_to_decimal_truncates_excess_precision() {
        // 12 integer digits + 18 fractional digits do not fit in 28 significant digits.
        let raw = U256::from_str("123456789012123456789012345678").unwrap();
        let value = to_decimal(raw, 18).unwrap();
        assert_eq!(value.inner().trunc(), RustDecimal::from(123_456_789_012i64));
    }

    #[test]
    fn test_to_raw_truncates_below_precision() {
        assert_eq!(to_raw(d("0.000123456"), 8).unwrap(), U256::from(12_345u64));
        assert_eq!(
            to_raw(d("2"), 18).unwrap(),
            U256::from(2_000_000_000_000_000_000u128)
        );
    }

    #[test]
    fn test_to_raw_rejects_negative() {
        assert!(matches!(to_raw(d("-1"), 18), Err(GatewayError::Decode(_))));
    }
}
