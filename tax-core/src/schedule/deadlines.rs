//! Quarterly estimated-payment due dates.
//!
//! | Quarter | Covers          | Statutory due date      |
//! |---------|-----------------|-------------------------|
//! | Q1      | Jan 1 - Mar 31  | April 15                |
//! | Q2      | Apr 1 - Jun 30  | June 15                 |
//! | Q3      | Jul 1 - Sep 30  | September 15            |
//! | Q4      | Oct 1 - Dec 31  | January 15, following year |
//!
//! A due date on a weekend or holiday moves to the next business day.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::debug;

use super::holidays::{HolidayCalendar, UsFederalHolidays};
use crate::models::{DeadlineStatus, PeriodError, Quarter, TaxDeadline, TaxPeriod, date};

/// The unadjusted due date for `quarter` of `tax_year`.
pub fn statutory_due_date(
    tax_year: i32,
    quarter: Quarter,
) -> Result<NaiveDate, PeriodError> {
    match quarter {
        Quarter::Q1 => date(tax_year, 4, 15),
        Quarter::Q2 => date(tax_year, 6, 15),
        Quarter::Q3 => date(tax_year, 9, 15),
        Quarter::Q4 => date(tax_year + 1, 1, 15),
    }
}

/// Produces [`TaxDeadline`]s using a [`HolidayCalendar`].
#[derive(Debug, Clone, Default)]
pub struct DeadlineScheduler<C = UsFederalHolidays> {
    calendar: C,
}

impl<C: HolidayCalendar> DeadlineScheduler<C> {
    pub fn new(calendar: C) -> Self {
        Self { calendar }
    }

    pub fn calendar(&self) -> &C {
        &self.calendar
    }

    pub fn deadline(
        &self,
        tax_year: i32,
        quarter: Quarter,
    ) -> Result<TaxDeadline, PeriodError> {
        let period = TaxPeriod::quarter(tax_year, quarter)?;
        let original_due_date = statutory_due_date(tax_year, quarter)?;
        let due_date = self.calendar.next_business_day(original_due_date);

        if due_date != original_due_date {
            debug!(
                tax_year,
                %quarter,
                %original_due_date,
                %due_date,
                "due date shifted to next business day"
            );
        }

        Ok(TaxDeadline {
            tax_year,
            quarter,
            period_start: period.start,
            period_end: period.end,
            due_date,
            original_due_date,
            holiday_adjusted: due_date != original_due_date,
        })
    }

    /// All four deadlines for `tax_year`, in quarter order.
    pub fn deadlines(
        &self,
        tax_year: i32,
    ) -> Result<Vec<TaxDeadline>, PeriodError> {
        Quarter::ALL
            .into_iter()
            .map(|quarter| self.deadline(tax_year, quarter))
            .collect()
    }

    /// The earliest deadline across `tax_years` whose due date is on or
    /// after `today`.
    ///
    /// Q4 of a tax year falls due in January of the next calendar year, so
    /// callers pass both the previous and the current year.
    pub fn next_deadline(
        &self,
        today: NaiveDate,
        tax_years: &[i32],
    ) -> Result<Option<TaxDeadline>, PeriodError> {
        let mut upcoming = None::<TaxDeadline>;
        for &tax_year in tax_years {
            for deadline in self.deadlines(tax_year)? {
                if deadline.due_date < today {
                    continue;
                }
                if upcoming.as_ref().is_none_or(|best| deadline.due_date < best.due_date) {
                    upcoming = Some(deadline);
                }
            }
        }
        Ok(upcoming)
    }
}

/// Views `deadline` from `today` given what has been paid toward it.
///
/// A deadline is overdue only once its due date has passed with nothing paid.
pub fn deadline_status(
    deadline: TaxDeadline,
    today: NaiveDate,
    amount_paid: Decimal,
) -> DeadlineStatus {
    let days_until_due = (deadline.due_date - today).num_days();
    let is_overdue = days_until_due < 0 && amount_paid <= Decimal::ZERO;
    DeadlineStatus {
        deadline,
        days_until_due,
        amount_paid,
        is_overdue,
    }
}
