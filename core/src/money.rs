//! Integer money and rate arithmetic.
//!
//! All currency amounts are held in minor units (paise, cents) and all
//! rates and percentages in basis points, so every calculation is exact
//! integer math with a single explicit rounding step.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// Basis points in one hundred percent.
pub const BPS_PER_WHOLE: i64 = 10_000;

/// A currency amount in minor units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(pub i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn minor(self) -> i64 {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Apply a basis-point rate, rounding half-up to the minor unit.
    /// `None` when the result does not fit in an `i64`.
    pub fn apply_rate(self, rate: Bps) -> Option<Money> {
        let product = i128::from(self.0) * i128::from(rate.0);
        i64::try_from(round_half_up_div(product, i128::from(BPS_PER_WHOLE)))
            .ok()
            .map(Money)
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |a, b| a + b)
    }
}

/// Renders with two decimal places (minor unit = 1/100).
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// A rate or percentage in basis points (1 bps = 0.01%).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bps(pub i64);

impl Bps {
    pub const ZERO: Bps = Bps(0);
    pub const WHOLE: Bps = Bps(BPS_PER_WHOLE);

    /// Convert a percentage such as `12.5` into basis points, rounding
    /// to the nearest basis point.
    pub fn from_percent(pct: f64) -> Bps {
        Bps((pct * 100.0).round() as i64)
    }

    pub fn as_percent(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl Add for Bps {
    type Output = Bps;
    fn add(self, rhs: Bps) -> Bps {
        Bps(self.0 + rhs.0)
    }
}

/// Renders as a percentage with two decimals, e.g. `12.50`.
impl fmt::Display for Bps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Integer division rounding half away from zero.
fn round_half_up_div(numerator: i128, denominator: i128) -> i128 {
    let half = denominator / 2;
    if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        (numerator - half) / denominator
    }
}
