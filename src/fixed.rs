// 1.0 fixed.rs: signed fixed-point with 18 fractional digits ("fixed18").
// raw representation is i128 scaled by 1e18. every monetary amount, position
// size, price, weight and multiplier in the engine is a Fixed18.
//
// mul/div go through 256-bit intermediates (ethnum) and range-check back into
// i128. overflow and divide-by-zero are hard errors, never silent truncation:
// reconciliation downstream depends on exact equality.

use ethnum::{I256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const SCALE: i128 = 1_000_000_000_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    #[error("fixed-point overflow")]
    Overflow,
    #[error("fixed-point divide by zero")]
    DivideByZero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Fixed18(i128);

impl Fixed18 {
    pub const ZERO: Fixed18 = Fixed18(0);
    pub const ONE: Fixed18 = Fixed18(SCALE);
    pub const TWO: Fixed18 = Fixed18(2 * SCALE);
    pub const MIN: Fixed18 = Fixed18(i128::MIN);
    pub const MAX: Fixed18 = Fixed18(i128::MAX);

    pub const fn from_raw(raw: i128) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> i128 {
        self.0
    }

    // whole units, e.g. from_int(5) == 5.0
    pub const fn from_int(n: i64) -> Self {
        Self(n as i128 * SCALE)
    }

    pub fn from_ratio(num: i128, den: i128) -> Result<Self, MathError> {
        Self(num.checked_mul(SCALE).ok_or(MathError::Overflow)?).div_raw(den)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn abs(&self) -> Self {
        // MIN.abs() saturates; callers that care about MIN check it first
        Self(self.0.saturating_abs())
    }

    pub fn min(self, other: Self) -> Self {
        if self.0 <= other.0 { self } else { other }
    }

    pub fn max(self, other: Self) -> Self {
        if self.0 >= other.0 { self } else { other }
    }

    pub fn signum(&self) -> i128 {
        self.0.signum()
    }

    pub fn add(self, other: Self) -> Result<Self, MathError> {
        self.0.checked_add(other.0).map(Self).ok_or(MathError::Overflow)
    }

    pub fn sub(self, other: Self) -> Result<Self, MathError> {
        self.0.checked_sub(other.0).map(Self).ok_or(MathError::Overflow)
    }

    pub fn neg(self) -> Result<Self, MathError> {
        self.0.checked_neg().map(Self).ok_or(MathError::Overflow)
    }

    // a*b/1e18, truncated toward zero
    pub fn mul(self, other: Self) -> Result<Self, MathError> {
        let wide = I256::from(self.0) * I256::from(other.0);
        narrow(wide / I256::from(SCALE))
    }

    // a*1e18/b, truncated toward zero
    pub fn div(self, other: Self) -> Result<Self, MathError> {
        if other.0 == 0 {
            return Err(MathError::DivideByZero);
        }
        let wide = I256::from(self.0) * I256::from(SCALE);
        narrow(wide / I256::from(other.0))
    }

    fn div_raw(self, den: i128) -> Result<Self, MathError> {
        if den == 0 {
            return Err(MathError::DivideByZero);
        }
        self.0.checked_div(den).map(Self).ok_or(MathError::Overflow)
    }

    // integer Newton's method. sqrt(x) is itself a fixed18, so the radicand
    // is raw * 1e18 computed in 256 bits. negative input is a caller error.
    pub fn sqrt(self) -> Result<Self, MathError> {
        if self.0 < 0 {
            return Err(MathError::Overflow);
        }
        if self.0 == 0 {
            return Ok(Self::ZERO);
        }
        let n = U256::from(self.0 as u128) * U256::from(SCALE as u128);
        let mut x = U256::ONE << ((256 - n.leading_zeros() + 1) / 2);
        let mut y = (x + n / x) >> 1;
        while y < x {
            x = y;
            y = (x + n / x) >> 1;
        }
        // x <= sqrt(i128::MAX * 1e18) < i128::MAX, always narrows
        Ok(Self(x.as_u128() as i128))
    }

    // binary exponentiation with fixed-point mul. used for per-second
    // interest compounding over an integer number of seconds.
    pub fn powi(self, mut exp: u64) -> Result<Self, MathError> {
        let mut base = self;
        let mut acc = Self::ONE;
        while exp > 0 {
            if exp & 1 == 1 {
                acc = acc.mul(base)?;
            }
            exp >>= 1;
            if exp > 0 {
                base = base.mul(base)?;
            }
        }
        Ok(acc)
    }

    // round toward zero to a multiple of `increment` (> 0)
    pub fn round_down_to(self, increment: Self) -> Result<Self, MathError> {
        if increment.0 <= 0 {
            return Err(MathError::DivideByZero);
        }
        Ok(Self(self.0 / increment.0 * increment.0))
    }
}

fn narrow(wide: I256) -> Result<Fixed18, MathError> {
    if wide > I256::from(i128::MAX) || wide < I256::from(i128::MIN) {
        return Err(MathError::Overflow);
    }
    Ok(Fixed18(wide.as_i128()))
}

impl fmt::Display for Fixed18 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let int = abs / SCALE as u128;
        let frac = abs % SCALE as u128;
        if frac == 0 {
            write!(f, "{}{}", sign, int)
        } else {
            let frac_str = format!("{:018}", frac);
            write!(f, "{}{}.{}", sign, int, frac_str.trim_end_matches('0'))
        }
    }
}
