//! Business-day calendar used to shift due dates off weekends and holidays.

use chrono::{Datelike, Days, NaiveDate, Weekday};

/// Decides which days are business days for due-date purposes.
pub trait HolidayCalendar: Send + Sync {
    /// Whether `date` is an observed holiday. Weekends are handled separately.
    fn is_holiday(
        &self,
        date: NaiveDate,
    ) -> bool;

    fn is_business_day(
        &self,
        date: NaiveDate,
    ) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.is_holiday(date)
    }

    /// `date` itself if it is a business day, otherwise the next one.
    fn next_business_day(
        &self,
        date: NaiveDate,
    ) -> NaiveDate {
        let mut day = date;
        while !self.is_business_day(day) {
            match day.checked_add_days(Days::new(1)) {
                Some(next) => day = next,
                None => break,
            }
        }
        day
    }
}

/// U.S. federal legal holidays as observed by federal offices, plus
/// District of Columbia Emancipation Day, which the IRS also honours for
/// filing deadlines.
///
/// Fixed-date holidays falling on a Saturday are observed the Friday
/// before; on a Sunday, the Monday after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsFederalHolidays {
    pub include_emancipation_day: bool,
}

impl Default for UsFederalHolidays {
    fn default() -> Self {
        Self {
            include_emancipation_day: true,
        }
    }
}

impl UsFederalHolidays {
    /// Observed holiday dates for `year`, each with its name.
    pub fn observed(
        &self,
        year: i32,
    ) -> Vec<(NaiveDate, &'static str)> {
        let mut holidays = Vec::with_capacity(12);
        let mut fixed = |month: u32, day: u32, name: &'static str| {
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                holidays.push((observe(date), name));
            }
        };

        fixed(1, 1, "New Year's Day");
        if year >= 2021 {
            fixed(6, 19, "Juneteenth National Independence Day");
        }
        fixed(7, 4, "Independence Day");
        fixed(11, 11, "Veterans Day");
        fixed(12, 25, "Christmas Day");
        if self.include_emancipation_day && year >= 2005 {
            fixed(4, 16, "DC Emancipation Day");
        }

        let floating = [
            (1, Weekday::Mon, 3, "Birthday of Martin Luther King, Jr."),
            (2, Weekday::Mon, 3, "Washington's Birthday"),
            (9, Weekday::Mon, 1, "Labor Day"),
            (10, Weekday::Mon, 2, "Columbus Day"),
            (11, Weekday::Thu, 4, "Thanksgiving Day"),
        ];
        for (month, weekday, n, name) in floating {
            if let Some(date) = NaiveDate::from_weekday_of_month_opt(year, month, weekday, n) {
                holidays.push((date, name));
            }
        }
        if let Some(date) = last_weekday_of_month(year, 5, Weekday::Mon) {
            holidays.push((date, "Memorial Day"));
        }

        holidays.sort_by_key(|(date, _)| *date);
        holidays
    }
}

impl HolidayCalendar for UsFederalHolidays {
    fn is_holiday(
        &self,
        date: NaiveDate,
    ) -> bool {
        // New Year's Day on a Saturday is observed on December 31 of the prior year.
        [date.year(), date.year() + 1]
            .into_iter()
            .flat_map(|year| self.observed(year))
            .any(|(holiday, _)| holiday == date)
    }
}

fn observe(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date.pred_opt().unwrap_or(date),
        Weekday::Sun => date.succ_opt().unwrap_or(date),
        _ => date,
    }
}

fn last_weekday_of_month(
    year: i32,
    month: u32,
    weekday: Weekday,
) -> Option<NaiveDate> {
    (1..=5)
        .rev()
        .find_map(|n| NaiveDate::from_weekday_of_month_opt(year, month, weekday, n))
}
