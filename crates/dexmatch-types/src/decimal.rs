//! Fixed-precision decimal arithmetic.
//!
//! Every amount in the exchange core is a [`Decimal`]. Products and
//! quotients are truncated toward zero to [`PRECISION`] fractional digits so
//! that two validators computing the same expression always land on the
//! same value, regardless of how many intermediate digits the operands
//! carried. No IEEE floats anywhere.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::{ExchangeError, Result};

/// Number of fractional digits kept after every derived computation.
pub const PRECISION: u32 = 18;

/// Deterministic helpers on top of [`Decimal`].
pub trait DecimalExt: Sized {
    /// Truncate toward zero to [`PRECISION`] fractional digits.
    #[must_use]
    fn trunc_dp(self) -> Self;

    /// `self * rhs`, truncated. Fails on overflow.
    fn mul_trunc(self, rhs: Self) -> Result<Self>;

    /// `self / rhs`, truncated. Fails on a zero divisor or overflow.
    fn quo_trunc(self, rhs: Self) -> Result<Self>;

    /// `self + rhs`. Fails on overflow.
    fn add_checked(self, rhs: Self) -> Result<Self>;

    /// `self - rhs`. Fails on overflow.
    fn sub_checked(self, rhs: Self) -> Result<Self>;

    /// Strictly greater than zero.
    fn is_positive_strict(&self) -> bool;
}

impl DecimalExt for Decimal {
    fn trunc_dp(self) -> Self {
        let mut out = self.round_dp_with_strategy(PRECISION, RoundingStrategy::ToZero);
        // -0 and 0 must serialize identically
        if out.is_zero() {
            out = Decimal::ZERO;
        }
        out.normalize()
    }

    fn mul_trunc(self, rhs: Self) -> Result<Self> {
        self.checked_mul(rhs)
            .map(DecimalExt::trunc_dp)
            .ok_or_else(|| ExchangeError::ArithmeticOverflow {
                op: format!("{self} * {rhs}"),
            })
    }

    fn quo_trunc(self, rhs: Self) -> Result<Self> {
        if rhs.is_zero() {
            return Err(ExchangeError::DivisionByZero {
                op: format!("{self} / 0"),
            });
        }
        self.checked_div(rhs)
            .map(DecimalExt::trunc_dp)
            .ok_or_else(|| ExchangeError::ArithmeticOverflow {
                op: format!("{self} / {rhs}"),
            })
    }

    fn add_checked(self, rhs: Self) -> Result<Self> {
        self.checked_add(rhs)
            .ok_or_else(|| ExchangeError::ArithmeticOverflow {
                op: format!("{self} + {rhs}"),
            })
    }

    fn sub_checked(self, rhs: Self) -> Result<Self> {
        self.checked_sub(rhs)
            .ok_or_else(|| ExchangeError::ArithmeticOverflow {
                op: format!("{self} - {rhs}"),
            })
    }

    fn is_positive_strict(&self) -> bool {
        self.is_sign_positive() && !self.is_zero()
    }
}

/// Parse a decimal string, rejecting anything that carries more than
/// [`PRECISION`] fractional digits.
pub fn parse_decimal(s: &str) -> Result<Decimal> {
    let value = Decimal::from_str(s.trim()).map_err(|e| ExchangeError::Serialization(format!(
        "invalid decimal {s:?}: {e}"
    )))?;
    if value.scale() > PRECISION {
        return Err(ExchangeError::Serialization(format!(
            "decimal {s:?} exceeds {PRECISION} fractional digits"
        )));
    }
    Ok(value)
}

/// Weighted average of two `(price, quantity)` samples, truncated.
///
/// Returns `ZERO` when the combined quantity is zero.
pub fn weighted_average(
    price_a: Decimal,
    qty_a: Decimal,
    price_b: Decimal,
    qty_b: Decimal,
) -> Result<Decimal> {
    let total_qty = qty_a.add_checked(qty_b)?;
    if total_qty.is_zero() {
        return Ok(Decimal::ZERO);
    }
    let notional = price_a
        .mul_trunc(qty_a)?
        .add_checked(price_b.mul_trunc(qty_b)?)?;
    notional.quo_trunc(total_qty)
}
