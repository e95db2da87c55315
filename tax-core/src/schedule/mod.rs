//! Estimated-payment calendar.

pub mod deadlines;
pub mod holidays;

pub use deadlines::{DeadlineScheduler, deadline_status, statutory_due_date};
pub use holidays::{HolidayCalendar, UsFederalHolidays};
