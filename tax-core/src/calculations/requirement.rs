//! Whether quarterly estimated payments are generally required.
//!
//! The test is on projected total tax **liability** (the $1,000 rule), not on
//! income. It is unrelated to the $5,000 platform reporting threshold.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::calculations::common::round_half_up;

/// Projected liability at or above which quarterly payments are required.
pub const QUARTERLY_PAYMENT_THRESHOLD: Decimal = dec!(1000);

/// Attached to every assessment. Product and legal depend on its presence.
pub const ASSESSMENT_DISCLAIMER: &str = "This assessment is based on current IRS guidance \
for estimated tax payments (Form 1040-ES) and is provided for informational purposes only. \
It is not tax advice. Please consult a qualified tax professional about your specific situation.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarterlyRequirementAssessment {
    pub quarterly_payments_required: bool,
    pub assessment_message: String,
    pub threshold_amount: Decimal,
    pub disclaimer: String,
}

/// Assesses `projected_total_tax_liability` against the statutory $1,000 threshold.
///
/// # Example
///
/// ```
/// use rust_decimal_macros::dec;
/// use tax_core::calculations::assess_quarterly_requirement;
///
/// assert!(assess_quarterly_requirement(dec!(1000)).quarterly_payments_required);
/// assert!(!assess_quarterly_requirement(dec!(999.99)).quarterly_payments_required);
/// ```
pub fn assess_quarterly_requirement(
    projected_total_tax_liability: Decimal,
) -> QuarterlyRequirementAssessment {
    assess_with_threshold(projected_total_tax_liability, QUARTERLY_PAYMENT_THRESHOLD)
}

/// Assesses against a configured threshold; the boundary is inclusive.
pub fn assess_with_threshold(
    projected_total_tax_liability: Decimal,
    threshold: Decimal,
) -> QuarterlyRequirementAssessment {
    let required = projected_total_tax_liability >= threshold;
    let liability = round_half_up(projected_total_tax_liability);
    let threshold_display = round_half_up(threshold);

    let assessment_message = if required {
        format!(
            "Your projected tax liability of ${liability:.2} is at or above ${threshold_display:.2}. \
             You generally need to make quarterly estimated tax payments."
        )
    } else if projected_total_tax_liability <= Decimal::ZERO {
        format!(
            "You have no projected tax liability. Quarterly estimated tax payments are \
             generally not required while your liability stays below ${threshold_display:.2}."
        )
    } else {
        format!(
            "Your projected tax liability of ${liability:.2} is below ${threshold_display:.2}. \
             Quarterly estimated tax payments are generally not required."
        )
    };

    QuarterlyRequirementAssessment {
        quarterly_payments_required: required,
        assessment_message,
        threshold_amount: threshold,
        disclaimer: ASSESSMENT_DISCLAIMER.to_string(),
    }
}
