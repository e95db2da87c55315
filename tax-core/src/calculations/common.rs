//! Shared decimal helpers for the calculators.
//!
//! The calculators themselves never round. [`round_half_up`] exists for
//! presentation callers that format results as currency.

use std::collections::BTreeMap;

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Largest difference between a breakdown's sum and its aggregate total that
/// is still treated as rounding noise.
pub const BREAKDOWN_TOLERANCE: Decimal = dec!(0.01);

/// Rounds a decimal value to exactly two decimal places using half-up rounding.
///
/// Values at exactly 0.005 round away from zero.
///
/// # Examples
///
/// ```
/// use rust_decimal_macros::dec;
/// use tax_core::calculations::common::round_half_up;
///
/// assert_eq!(round_half_up(dec!(1412.95965)), dec!(1412.96));
/// assert_eq!(round_half_up(dec!(123.455)), dec!(123.46));
/// assert_eq!(round_half_up(dec!(-123.455)), dec!(-123.46));
/// ```
pub fn round_half_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Returns the larger of two decimal values.
pub fn max(
    a: Decimal,
    b: Decimal,
) -> Decimal {
    if a > b { a } else { b }
}

/// Sum of every amount in a platform or category breakdown.
pub fn breakdown_sum(breakdown: &BTreeMap<String, Decimal>) -> Decimal {
    breakdown.values().copied().sum()
}

/// Whether `a` and `b` differ by no more than [`BREAKDOWN_TOLERANCE`].
pub fn within_tolerance(
    a: Decimal,
    b: Decimal,
) -> bool {
    (a - b).abs() <= BREAKDOWN_TOLERANCE
}
