//! Pure tax calculations.
//!
//! Every function here is a deterministic transformation of its inputs with
//! no shared state, safe to call concurrently from any number of callers.

pub mod common;
pub mod income_tax;
pub mod quarterly_estimate;
pub mod requirement;
pub mod self_employment;

pub use income_tax::{IncomeTaxCalculator, calculate_income_tax};
pub use quarterly_estimate::{EstimateInput, QuarterlyEstimateCalculator};
pub use requirement::{
    ASSESSMENT_DISCLAIMER, QUARTERLY_PAYMENT_THRESHOLD, QuarterlyRequirementAssessment,
    assess_quarterly_requirement, assess_with_threshold,
};
pub use self_employment::{
    SE_INCOME_MULTIPLIER, SE_TAX_RATE, SeTaxCalculator, SelfEmploymentTax,
    calculate_self_employment_tax,
};
