mod estimated_payment;
mod filing_status;
mod income_threshold;
mod tax_bracket;
mod tax_deadline;
mod tax_estimate;
mod tax_period;
mod tax_year_config;

pub use estimated_payment::{EstimatedPayment, NewEstimatedPayment, PaymentMethod};
pub use filing_status::{FilingStatus, FilingStatusCode};
pub use income_threshold::{IncomeThreshold, ThresholdLevel};
pub use tax_bracket::{Bracket, BracketTable, BracketTableError, TaxBracket, TaxBracketSchedule};
pub use tax_deadline::{DeadlineStatus, TaxDeadline};
pub use tax_estimate::{CalculationStatus, TaxEstimate};
pub use tax_period::{PeriodError, Quarter, TaxPeriod};
pub(crate) use tax_period::date;
pub use tax_year_config::{TaxYearConfig, TaxYearConfigError};
