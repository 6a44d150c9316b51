use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scale factor: 18 fractional decimal digits.
const ONE: u128 = 1_000_000_000_000_000_000;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedPointError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow")]
    Overflow,
}

/// Rounding direction for operations that truncate.
///
/// `Down` is the default everywhere; `Up` exists for callers that must not
/// undercount (interest accrual, debt valuation). The caller picks the mode
/// matching the safety direction required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rounding {
    Down,
    Up,
}

/// Unsigned fixed-point decimal with 18 fractional digits, stored in a
/// `u128`. Used for prices, ratios, and rates.
///
/// All arithmetic is checked: intermediates are widened to 256 bits, and any
/// result that does not fit the storage type fails with
/// [`FixedPointError::Overflow`] instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct D18(u128);

impl D18 {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(ONE);

    /// Wraps an already-scaled raw value (`raw = value * 10^18`).
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u128 {
        self.0
    }

    pub fn from_int(n: u128) -> Result<Self, FixedPointError> {
        n.checked_mul(ONE)
            .map(Self)
            .ok_or(FixedPointError::Overflow)
    }

    /// The value `numerator / denominator`, rounded down.
    pub fn from_rational(numerator: u128, denominator: u128) -> Result<Self, FixedPointError> {
        mul_div(numerator, ONE, denominator, Rounding::Down).map(Self)
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn mul(self, rhs: Self, rounding: Rounding) -> Result<Self, FixedPointError> {
        mul_div(self.0, rhs.0, ONE, rounding).map(Self)
    }

    pub fn div(self, rhs: Self, rounding: Rounding) -> Result<Self, FixedPointError> {
        mul_div(self.0, ONE, rhs.0, rounding).map(Self)
    }

    /// Scales an integer amount by this ratio: `amount * self`.
    pub fn mul_int(self, amount: u128, rounding: Rounding) -> Result<u128, FixedPointError> {
        mul_div(amount, self.0, ONE, rounding)
    }

    pub fn reciprocal(self, rounding: Rounding) -> Result<Self, FixedPointError> {
        Self::ONE.div(self, rounding)
    }
}

impl fmt::Display for D18 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let int = self.0 / ONE;
        let frac = self.0 % ONE;
        if frac == 0 {
            return write!(f, "{int}");
        }
        let digits = format!("{frac:018}");
        write!(f, "{int}.{}", digits.trim_end_matches('0'))
    }
}

/// Rescales `amount` from `from` to `to` decimal places.
///
/// Widening is exact; narrowing loses at most one smallest unit of the target
/// precision (under `Rounding::Down`).
pub fn convert_decimals(
    amount: u128,
    from: u8,
    to: u8,
    rounding: Rounding,
) -> Result<u128, FixedPointError> {
    if from == to {
        return Ok(amount);
    }
    if to > from {
        let factor = pow10(to - from)?;
        return amount.checked_mul(factor).ok_or(FixedPointError::Overflow);
    }
    let factor = pow10(from - to)?;
    mul_div(amount, 1, factor, rounding)
}

/// Signed difference `new − old`, failing when the magnitude exceeds `i128`.
pub fn signed_delta(new: u128, old: u128) -> Result<i128, FixedPointError> {
    if new >= old {
        i128::try_from(new - old).map_err(|_| FixedPointError::Overflow)
    } else {
        let magnitude = i128::try_from(old - new).map_err(|_| FixedPointError::Overflow)?;
        Ok(-magnitude)
    }
}

fn pow10(exp: u8) -> Result<u128, FixedPointError> {
    10u128
        .checked_pow(u32::from(exp))
        .ok_or(FixedPointError::Overflow)
}

/// `a * b / denom` with a full 256-bit intermediate product.
pub(crate) fn mul_div(
    a: u128,
    b: u128,
    denom: u128,
    rounding: Rounding,
) -> Result<u128, FixedPointError> {
    if denom == 0 {
        return Err(FixedPointError::DivisionByZero);
    }

    let (hi, lo) = wide_mul(a, b);
    // The quotient fits u128 iff the high limb is strictly below the divisor.
    if hi >= denom {
        return Err(FixedPointError::Overflow);
    }

    let (quotient, remainder) = if hi == 0 {
        (lo / denom, lo % denom)
    } else {
        div_rem_wide(hi, lo, denom)
    };

    match rounding {
        Rounding::Down => Ok(quotient),
        Rounding::Up if remainder > 0 => quotient.checked_add(1).ok_or(FixedPointError::Overflow),
        Rounding::Up => Ok(quotient),
    }
}

/// 128×128 → 256 multiplication, returned as `(hi, lo)` limbs.
fn wide_mul(a: u128, b: u128) -> (u128, u128) {
    const MASK: u128 = (1u128 << 64) - 1;
    let (a_hi, a_lo) = (a >> 64, a & MASK);
    let (b_hi, b_lo) = (b >> 64, b & MASK);

    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let hh = a_hi * b_hi;

    let mid = (ll >> 64) + (lh & MASK) + (hl & MASK);
    let lo = (mid << 64) | (ll & MASK);
    let hi = hh + (lh >> 64) + (hl >> 64) + (mid >> 64);
    (hi, lo)
}

/// Restoring division of the 256-bit value `hi·2^128 + lo` by `d`.
/// Caller guarantees `0 < hi < d`, so the quotient fits a `u128`.
fn div_rem_wide(hi: u128, lo: u128, d: u128) -> (u128, u128) {
    let mut rem = hi;
    let mut quo = 0u128;
    for i in (0..128).rev() {
        // rem may exceed 127 bits; track the shifted-out bit as a carry so
        // the comparison against d stays exact.
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> i) & 1);
        if carry != 0 || rem >= d {
            rem = rem.wrapping_sub(d);
            quo |= 1 << i;
        }
    }
    (quo, rem)
}
