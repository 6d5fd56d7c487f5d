use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const UZS_CURRENCY_CODE: &str = "UZS";
pub const UZS_CURRENCY_CODE_LOWER: &str = "uzs";

//--------------------------------------        Som        -----------------------------------------------------------
/// An Uzbek som amount, held as an integer number of tiyin (1 som = 100 tiyin).
///
/// Spreadsheet exports quote amounts in som with up to two decimal places, so tiyin precision is exact and amount
/// comparisons never go through floating point.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Som(i64);

op!(binary Som, Add, add);
op!(binary Som, Sub, sub);
op!(inplace Som, SubAssign, sub_assign);
op!(unary Som, Neg, neg);

impl Mul<i64> for Som {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Sum for Som {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in tiyin: {0}")]
pub struct SomConversionError(String);

impl From<i64> for Som {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Som {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Som {}

impl TryFrom<u64> for Som {
    type Error = SomConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(SomConversionError(format!("Value {value} is too large to convert to Som")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Som {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let som = self.0 as f64 / 100.0;
        write!(f, "{som:0.2} {UZS_CURRENCY_CODE}")
    }
}

impl Som {
    /// The raw amount in tiyin.
    pub const fn value(&self) -> i64 {
        self.0
    }

    pub const fn from_tiyin(tiyin: i64) -> Self {
        Self(tiyin)
    }

    pub const fn from_som(som: i64) -> Self {
        Self(som * 100)
    }

    /// Absolute difference between two amounts, used for tolerance checks.
    pub fn abs_diff(&self, other: Som) -> Som {
        Som((self.0 - other.0).abs())
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}
