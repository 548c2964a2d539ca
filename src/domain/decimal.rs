//! Exact decimal amounts backed by rust_decimal.

use rust_decimal::{Decimal as RustDecimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops;
use std::str::FromStr;

/// Token or LP amount. JSON carries it as a number, the store as a string.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Decimal(#[serde(with = "rust_decimal::serde::float")] RustDecimal);

impl Decimal {
    pub fn new(value: RustDecimal) -> Self {
        Decimal(value)
    }

    /// Parse without going through floating point.
    ///
    /// # Errors
    /// Returns an error if the string is not a valid decimal number.
    pub fn from_str_canonical(s: &str) -> Result<Self, rust_decimal::Error> {
        RustDecimal::from_str(s).map(Decimal)
    }

    /// Shortest plain representation: no exponent, no trailing zeros.
    ///
    /// This is the form written to the store.
    pub fn to_canonical_string(&self) -> String {
        self.0.normalize().to_string()
    }

    pub fn inner(&self) -> RustDecimal {
        self.0
    }

    pub fn zero() -> Self {
        Decimal(RustDecimal::ZERO)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Strictly greater than zero.
    pub fn is_positive(&self) -> bool {
        self.0 > RustDecimal::ZERO
    }

    /// Strictly less than zero.
    pub fn is_negative(&self) -> bool {
        self.0 < RustDecimal::ZERO
    }

    /// Drop digits beyond `dp` fractional places, rounding toward zero.
    pub fn truncate_to(&self, dp: u32) -> Self {
        Decimal(self.0.round_dp_with_strategy(dp, RoundingStrategy::ToZero))
    }

    /// `self - rhs`, floored at zero.
    pub fn saturating_sub(self, rhs: Decimal) -> Decimal {
        Decimal((self.0 - rhs.0).max(RustDecimal::ZERO))
    }

    /// True when `|self - other| > epsilon`.
    pub fn differs_from(&self, other: Decimal, epsilon: Decimal) -> bool {
        (self.0 - other.0).abs() > epsilon.0
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical_string())
    }
}

impl FromStr for Decimal {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}

impl From<RustDecimal> for Decimal {
    fn from(value: RustDecimal) -> Self {
        Decimal(value)
    }
}

macro_rules! forward_binop {
    ($($trait:ident :: $method:ident, $assign_trait:ident :: $assign_method:ident;)*) => {$(
        impl ops::$trait for Decimal {
            type Output = Decimal;

            fn $method(self, rhs: Decimal) -> Decimal {
                Decimal(ops::$trait::$method(self.0, rhs.0))
            }
        }

        impl ops::$assign_trait for Decimal {
            fn $assign_method(&mut self, rhs: Decimal) {
                ops::$assign_trait::$assign_method(&mut self.0, rhs.0);
            }
        }
    )*};
}

forward_binop! {
    Add::add, AddAssign::add_assign;
    Sub::sub, SubAssign::sub_assign;
    Mul::mul, MulAssign::mul_assign;
    Div::div, DivAssign::div_assign;
}
