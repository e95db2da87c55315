use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calculations::requirement::QUARTERLY_PAYMENT_THRESHOLD;
use crate::calculations::self_employment::{SE_INCOME_MULTIPLIER, SE_TAX_RATE};
use crate::tracking::threshold::{
    PLATFORM_INCOME_REPORTING_THRESHOLD, PLATFORM_INCOME_WARNING_THRESHOLD,
};

/// Errors raised by [`TaxYearConfig::validate`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaxYearConfigError {
    #[error("SE income multiplier must be between 0 and 1, got {0}")]
    InvalidSeIncomeMultiplier(Decimal),

    #[error("SE tax rate must be between 0 and 1, got {0}")]
    InvalidSeTaxRate(Decimal),

    #[error("quarterly payment threshold must be non-negative, got {0}")]
    InvalidQuarterlyPaymentThreshold(Decimal),

    #[error("platform income thresholds must satisfy 0 < warning ({warning}) <= reporting ({reporting})")]
    InvalidPlatformThresholds { warning: Decimal, reporting: Decimal },
}

/// Year-keyed constants injected into the calculators.
///
/// Swapping tax years means loading a different row of this configuration;
/// the calculation code never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxYearConfig {
    pub tax_year: i32,
    pub se_income_multiplier: Decimal,
    pub se_tax_rate: Decimal,
    pub quarterly_payment_threshold: Decimal,
    pub platform_income_warning_threshold: Decimal,
    pub platform_income_reporting_threshold: Decimal,
}

impl TaxYearConfig {
    /// Configuration built from the statutory constants currently in force.
    pub fn current_law(tax_year: i32) -> Self {
        Self {
            tax_year,
            se_income_multiplier: SE_INCOME_MULTIPLIER,
            se_tax_rate: SE_TAX_RATE,
            quarterly_payment_threshold: QUARTERLY_PAYMENT_THRESHOLD,
            platform_income_warning_threshold: PLATFORM_INCOME_WARNING_THRESHOLD,
            platform_income_reporting_threshold: PLATFORM_INCOME_REPORTING_THRESHOLD,
        }
    }

    /// Validates the configured values.
    ///
    /// # Errors
    ///
    /// Returns [`TaxYearConfigError`] if:
    /// - `se_income_multiplier` is not in (0, 1]
    /// - `se_tax_rate` is not in (0, 1]
    /// - `quarterly_payment_threshold` is negative
    /// - the platform thresholds are not positive and ascending
    pub fn validate(&self) -> Result<(), TaxYearConfigError> {
        if self.se_income_multiplier <= Decimal::ZERO || self.se_income_multiplier > Decimal::ONE {
            return Err(TaxYearConfigError::InvalidSeIncomeMultiplier(
                self.se_income_multiplier,
            ));
        }
        if self.se_tax_rate <= Decimal::ZERO || self.se_tax_rate > Decimal::ONE {
            return Err(TaxYearConfigError::InvalidSeTaxRate(self.se_tax_rate));
        }
        if self.quarterly_payment_threshold < Decimal::ZERO {
            return Err(TaxYearConfigError::InvalidQuarterlyPaymentThreshold(
                self.quarterly_payment_threshold,
            ));
        }
        if self.platform_income_warning_threshold <= Decimal::ZERO
            || self.platform_income_warning_threshold > self.platform_income_reporting_threshold
        {
            return Err(TaxYearConfigError::InvalidPlatformThresholds {
                warning: self.platform_income_warning_threshold,
                reporting: self.platform_income_reporting_threshold,
            });
        }
        Ok(())
    }
}
