//! Quarters and calculation periods within a tax year.
//!
//! Every time-sensitive operation takes an explicit period (or an explicit
//! `as_of` date) rather than reading the system clock.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when a quarter or period cannot be constructed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PeriodError {
    #[error("quarter must be between 1 and 4, got {0}")]
    QuarterOutOfRange(i64),

    #[error("period end {end} is before period start {start}")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },

    #[error("as-of date {as_of} is before the start of tax year {tax_year}")]
    AsOfBeforeTaxYear { tax_year: i32, as_of: NaiveDate },

    #[error("tax year {0} is outside the supported calendar range")]
    UnsupportedYear(i32),
}

/// One of the four 3-month estimated tax periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quarter {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quarter {
    pub const ALL: [Quarter; 4] = [Self::Q1, Self::Q2, Self::Q3, Self::Q4];

    pub fn number(&self) -> u8 {
        match self {
            Self::Q1 => 1,
            Self::Q2 => 2,
            Self::Q3 => 3,
            Self::Q4 => 4,
        }
    }

    /// First calendar month (1-based) covered by the quarter.
    fn first_month(&self) -> u32 {
        u32::from(self.number() - 1) * 3 + 1
    }

    /// The quarter containing `date`.
    pub fn containing(date: NaiveDate) -> Self {
        match date.month() {
            1..=3 => Self::Q1,
            4..=6 => Self::Q2,
            7..=9 => Self::Q3,
            _ => Self::Q4,
        }
    }
}

impl TryFrom<i64> for Quarter {
    type Error = PeriodError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Q1),
            2 => Ok(Self::Q2),
            3 => Ok(Self::Q3),
            4 => Ok(Self::Q4),
            other => Err(PeriodError::QuarterOutOfRange(other)),
        }
    }
}

impl TryFrom<u8> for Quarter {
    type Error = PeriodError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from(i64::from(value))
    }
}

impl fmt::Display for Quarter {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Q{}", self.number())
    }
}

/// The span of calendar days an estimate covers.
///
/// `quarter` is `None` for annual and year-to-date periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxPeriod {
    pub tax_year: i32,
    pub quarter: Option<Quarter>,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TaxPeriod {
    /// Builds a period from explicit bounds, rejecting an end before the start.
    pub fn new(
        tax_year: i32,
        quarter: Option<Quarter>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Self, PeriodError> {
        if end < start {
            return Err(PeriodError::EndBeforeStart { start, end });
        }
        Ok(Self {
            tax_year,
            quarter,
            start,
            end,
        })
    }

    /// The calendar quarter `quarter` of `tax_year`.
    pub fn quarter(
        tax_year: i32,
        quarter: Quarter,
    ) -> Result<Self, PeriodError> {
        let start = date(tax_year, quarter.first_month(), 1)?;
        let end = match quarter {
            Quarter::Q4 => date(tax_year, 12, 31)?,
            _ => date(tax_year, quarter.first_month() + 3, 1)?
                .pred_opt()
                .ok_or(PeriodError::UnsupportedYear(tax_year))?,
        };
        Self::new(tax_year, Some(quarter), start, end)
    }

    /// January 1 through December 31 of `tax_year`.
    pub fn annual(tax_year: i32) -> Result<Self, PeriodError> {
        Self::new(
            tax_year,
            None,
            date(tax_year, 1, 1)?,
            date(tax_year, 12, 31)?,
        )
    }

    /// January 1 through `as_of`, clamped to December 31 when `as_of` falls
    /// in a later year.
    pub fn year_to_date(
        tax_year: i32,
        as_of: NaiveDate,
    ) -> Result<Self, PeriodError> {
        let start = date(tax_year, 1, 1)?;
        if as_of < start {
            return Err(PeriodError::AsOfBeforeTaxYear { tax_year, as_of });
        }
        let end = as_of.min(date(tax_year, 12, 31)?);
        Self::new(tax_year, None, start, end)
    }

    /// Number of calendar days covered, inclusive of both ends.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn contains(
        &self,
        day: NaiveDate,
    ) -> bool {
        self.start <= day && day <= self.end
    }
}

pub(crate) fn date(
    year: i32,
    month: u32,
    day: u32,
) -> Result<NaiveDate, PeriodError> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or(PeriodError::UnsupportedYear(year))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn ymd(
        y: i32,
        m: u32,
        d: u32,
    ) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // =========================================================================
    // Quarter tests
    // =========================================================================

    #[test]
    fn quarter_try_from_accepts_one_through_four() {
        for n in 1u8..=4 {
            assert_eq!(Quarter::try_from(n).unwrap().number(), n);
        }
    }

    #[test]
    fn quarter_try_from_rejects_zero_and_five() {
        assert_eq!(Quarter::try_from(0u8), Err(PeriodError::QuarterOutOfRange(0)));
        assert_eq!(Quarter::try_from(5i64), Err(PeriodError::QuarterOutOfRange(5)));
    }

    #[test]
    fn quarter_containing_maps_months() {
        assert_eq!(Quarter::containing(ymd(2025, 3, 31)), Quarter::Q1);
        assert_eq!(Quarter::containing(ymd(2025, 4, 1)), Quarter::Q2);
        assert_eq!(Quarter::containing(ymd(2025, 9, 30)), Quarter::Q3);
        assert_eq!(Quarter::containing(ymd(2025, 12, 1)), Quarter::Q4);
    }

    // =========================================================================
    // TaxPeriod tests
    // =========================================================================

    #[test]
    fn quarter_periods_cover_calendar_quarters() {
        let q1 = TaxPeriod::quarter(2024, Quarter::Q1).unwrap();
        let q2 = TaxPeriod::quarter(2024, Quarter::Q2).unwrap();
        let q4 = TaxPeriod::quarter(2024, Quarter::Q4).unwrap();

        assert_eq!((q1.start, q1.end), (ymd(2024, 1, 1), ymd(2024, 3, 31)));
        assert_eq!((q2.start, q2.end), (ymd(2024, 4, 1), ymd(2024, 6, 30)));
        assert_eq!((q4.start, q4.end), (ymd(2024, 10, 1), ymd(2024, 12, 31)));
        assert_eq!(q1.quarter, Some(Quarter::Q1));
    }

    #[test]
    fn annual_period_spans_whole_year() {
        let year = TaxPeriod::annual(2024).unwrap();

        assert_eq!(year.quarter, None);
        assert_eq!(year.days(), 366); // leap year
    }

    #[test]
    fn year_to_date_ends_on_as_of() {
        let ytd = TaxPeriod::year_to_date(2025, ymd(2025, 5, 20)).unwrap();

        assert_eq!(ytd.start, ymd(2025, 1, 1));
        assert_eq!(ytd.end, ymd(2025, 5, 20));
        assert_eq!(ytd.days(), 140);
    }

    #[test]
    fn year_to_date_clamps_to_year_end() {
        let ytd = TaxPeriod::year_to_date(2025, ymd(2026, 2, 1)).unwrap();

        assert_eq!(ytd.end, ymd(2025, 12, 31));
    }

    #[test]
    fn year_to_date_rejects_as_of_before_year() {
        let result = TaxPeriod::year_to_date(2025, ymd(2024, 12, 31));

        assert_eq!(
            result,
            Err(PeriodError::AsOfBeforeTaxYear {
                tax_year: 2025,
                as_of: ymd(2024, 12, 31),
            })
        );
    }

    #[test]
    fn new_rejects_end_before_start() {
        let result = TaxPeriod::new(2025, None, ymd(2025, 6, 1), ymd(2025, 5, 31));

        assert_eq!(
            result,
            Err(PeriodError::EndBeforeStart {
                start: ymd(2025, 6, 1),
                end: ymd(2025, 5, 31),
            })
        );
    }

    #[test]
    fn single_day_period_is_valid() {
        let period = TaxPeriod::new(2025, None, ymd(2025, 1, 1), ymd(2025, 1, 1)).unwrap();

        assert_eq!(period.days(), 1);
        assert!(period.contains(ymd(2025, 1, 1)));
        assert!(!period.contains(ymd(2025, 1, 2)));
    }
}
