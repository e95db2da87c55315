use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{FilingStatusCode, Quarter};
use crate::calculations::common::max;

/// Lifecycle state of a stored estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalculationStatus {
    /// Calculated from the latest known income and expenses.
    Current,
    /// New income has been recorded since the estimate was calculated.
    Stale,
    /// The quarterly payment amount was set by hand.
    ManualOverride,
}

impl CalculationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Stale => "stale",
            Self::ManualOverride => "manual_override",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "current" => Some(Self::Current),
            "stale" => Some(Self::Stale),
            "manual_override" => Some(Self::ManualOverride),
            _ => None,
        }
    }
}

impl fmt::Display for CalculationStatus {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A snapshot of a computed quarterly or annual tax position.
///
/// One estimate exists per (owner, tax year, quarter); `quarter` is `None`
/// for annual and year-to-date estimates. A later calculation for the same
/// key replaces the stored row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxEstimate {
    pub owner_id: i64,
    pub tax_year: i32,
    pub quarter: Option<Quarter>,
    pub filing_status: FilingStatusCode,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,

    // Aggregates supplied by the income and expense collaborators
    pub gross_income: Decimal,
    pub income_by_platform: BTreeMap<String, Decimal>,
    pub total_deductions: Decimal,
    pub deductions_by_category: BTreeMap<String, Decimal>,

    // Calculated values
    pub net_profit: Decimal,
    pub se_taxable_income: Decimal,
    pub self_employment_tax: Decimal,
    pub se_tax_deduction: Decimal,
    pub taxable_income: Decimal,
    pub income_tax: Decimal,
    pub effective_tax_rate: Option<Decimal>,
    pub prior_withholding: Decimal,
    pub total_tax_liability: Decimal,
    pub quarterly_payment: Decimal,

    pub status: CalculationStatus,
    pub calculated_at: DateTime<Utc>,
}

impl TaxEstimate {
    /// Liability left after prior withholding, never below zero.
    ///
    /// Withholding is tracked separately; it does not reduce
    /// `total_tax_liability` itself.
    pub fn remaining_owed(&self) -> Decimal {
        max(self.total_tax_liability - self.prior_withholding, Decimal::ZERO)
    }

    pub fn is_annual(&self) -> bool {
        self.quarter.is_none()
    }
}
