//! Precision-safe decimal types for liquidation prices and volumes.
//!
//! Uses `rust_decimal` for exact decimal arithmetic so that bucket
//! boundaries and accumulated volumes never drift the way `f64` sums do.
//! A `Decimal` is always finite, so a value that made it into one of these
//! types has already passed the finiteness half of event validation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Price with exact decimal precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl Price {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Floor to the lower edge of a fixed-width bucket.
    ///
    /// `floor(price / width) * width`. A zero width leaves the price as is.
    /// `None` if the quotient or product leaves the `Decimal` range.
    #[inline]
    pub fn floor_to_bucket(&self, width: Price) -> Option<Self> {
        if width.is_zero() {
            return Some(*self);
        }
        let slots = self.0.checked_div(width.0)?.floor();
        Some(Self(slots.checked_mul(width.0)?.normalize()))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Price {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

impl From<Decimal> for Price {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl TryFrom<f64> for Price {
    type Error = rust_decimal::Error;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Decimal::try_from(value).map(Self)
    }
}

/// Liquidated volume with exact decimal precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Size(pub Decimal);

impl Size {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// `None` on overflow.
    #[inline]
    pub fn checked_add(&self, rhs: Size) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    /// Clamps at `Decimal::MAX`. For totals that are only reported.
    #[inline]
    pub fn saturating_add(&self, rhs: Size) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Size {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

impl From<Decimal> for Size {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl TryFrom<f64> for Size {
    type Error = rust_decimal::Error;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Decimal::try_from(value).map(Self)
    }
}
