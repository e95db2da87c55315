//! Stateful trackers backed by a [`TaxRepository`](crate::db::TaxRepository).

pub mod payments;
pub mod threshold;

pub use payments::{PaymentLedger, remaining_owed, sum_payments};
pub use threshold::{
    PLATFORM_INCOME_REPORTING_THRESHOLD, PLATFORM_INCOME_WARNING_THRESHOLD, ThresholdCrossing,
    ThresholdMarks, ThresholdTracker, apply_platform_income, remove_platform_income,
};
