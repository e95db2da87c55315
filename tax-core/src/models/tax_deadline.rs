use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Quarter;

/// The due date for one (tax year, quarter), treated as reference data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxDeadline {
    pub tax_year: i32,
    pub quarter: Quarter,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub due_date: NaiveDate,
    /// The statutory date before any weekend or holiday shift.
    pub original_due_date: NaiveDate,
    pub holiday_adjusted: bool,
}

/// A deadline viewed from a particular day for a particular owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlineStatus {
    pub deadline: TaxDeadline,
    /// Negative once the due date has passed.
    pub days_until_due: i64,
    pub amount_paid: Decimal,
    pub is_overdue: bool,
}
