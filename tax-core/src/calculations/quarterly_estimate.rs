//! Full tax estimate for a quarter, a year, or the year to date.
//!
//! | Step | Value |
//! |------|-------|
//! | 1    | Net profit: gross income − total deductions (may be negative) |
//! | 2    | SE tax figures on net profit |
//! | 3    | Taxable income: max(0, net profit) − SE tax deduction, floored at 0 |
//! | 4    | Income tax on taxable income via the bracket table |
//! | 5    | Total liability: SE tax + income tax |
//! | 6    | Quarterly payment: liability ÷ 4 for annual/YTD periods, the liability itself for a single quarter |
//! | 7    | Effective rate: liability ÷ gross income when gross income > 0 |
//!
//! Prior withholding is carried on the estimate for display of the remaining
//! balance; it never reduces the liability.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::calculations::common::{breakdown_sum, max, within_tolerance};
use crate::calculations::income_tax::IncomeTaxCalculator;
use crate::calculations::self_employment::SeTaxCalculator;
use crate::error::TaxEngineError;
use crate::models::{
    BracketTable, CalculationStatus, FilingStatusCode, TaxEstimate, TaxPeriod, TaxYearConfig,
};

const QUARTERS_PER_YEAR: Decimal = dec!(4);

/// Aggregated figures for one owner and period.
///
/// Income and expense totals come from the external aggregators already
/// deduplicated and currency-normalised. Absent figures are zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimateInput {
    pub owner_id: i64,
    pub period: TaxPeriod,
    pub filing_status: FilingStatusCode,
    pub gross_income: Decimal,
    pub income_by_platform: BTreeMap<String, Decimal>,
    pub total_deductions: Decimal,
    pub deductions_by_category: BTreeMap<String, Decimal>,
    pub prior_withholding: Decimal,
}

impl EstimateInput {
    /// An input with every amount zero.
    pub fn empty(
        owner_id: i64,
        period: TaxPeriod,
        filing_status: FilingStatusCode,
    ) -> Self {
        Self {
            owner_id,
            period,
            filing_status,
            gross_income: Decimal::ZERO,
            income_by_platform: BTreeMap::new(),
            total_deductions: Decimal::ZERO,
            deductions_by_category: BTreeMap::new(),
            prior_withholding: Decimal::ZERO,
        }
    }

    /// Checks the input against its contract.
    ///
    /// # Errors
    ///
    /// - [`TaxEngineError::InvalidAmount`] for a negative total, breakdown
    ///   entry or withholding figure
    /// - [`TaxEngineError::InconsistentTotals`] when a non-empty breakdown
    ///   does not sum to its total within one cent
    pub fn validate(&self) -> Result<(), TaxEngineError> {
        non_negative("gross_income", self.gross_income)?;
        non_negative("total_deductions", self.total_deductions)?;
        non_negative("prior_withholding", self.prior_withholding)?;

        check_breakdown(
            "income_by_platform",
            self.gross_income,
            &self.income_by_platform,
        )?;
        check_breakdown(
            "deductions_by_category",
            self.total_deductions,
            &self.deductions_by_category,
        )
    }
}

fn non_negative(
    field: &str,
    value: Decimal,
) -> Result<(), TaxEngineError> {
    if value < Decimal::ZERO {
        return Err(TaxEngineError::invalid_amount(field, value));
    }
    Ok(())
}

fn check_breakdown(
    field: &str,
    total: Decimal,
    breakdown: &BTreeMap<String, Decimal>,
) -> Result<(), TaxEngineError> {
    if breakdown.is_empty() {
        return Ok(());
    }
    for (key, amount) in breakdown {
        non_negative(&format!("{field}.{key}"), *amount)?;
    }
    let sum = breakdown_sum(breakdown);
    if !within_tolerance(sum, total) {
        return Err(TaxEngineError::InconsistentTotals {
            field: field.to_string(),
            total,
            breakdown_sum: sum,
        });
    }
    Ok(())
}

/// Combines the SE and income tax calculators into a [`TaxEstimate`].
#[derive(Debug, Clone, Copy)]
pub struct QuarterlyEstimateCalculator<'a> {
    se_tax: SeTaxCalculator,
    income_tax: IncomeTaxCalculator<'a>,
    tax_year: i32,
    filing_status: FilingStatusCode,
}

impl<'a> QuarterlyEstimateCalculator<'a> {
    pub fn new(
        config: &TaxYearConfig,
        brackets: &'a BracketTable,
    ) -> Self {
        Self {
            se_tax: SeTaxCalculator::from_tax_year_config(config),
            income_tax: IncomeTaxCalculator::new(brackets),
            tax_year: brackets.tax_year(),
            filing_status: brackets.filing_status(),
        }
    }

    /// Calculates the estimate for `input`, stamped with `calculated_at`.
    ///
    /// An input with no income and no deductions yields a valid all-zero
    /// estimate.
    ///
    /// # Errors
    ///
    /// - [`TaxEngineError::UnknownFilingStatus`] if the bracket table is for a
    ///   different tax year or filing status than the input
    /// - any error from [`EstimateInput::validate`]
    pub fn calculate(
        &self,
        input: &EstimateInput,
        calculated_at: DateTime<Utc>,
    ) -> Result<TaxEstimate, TaxEngineError> {
        if input.period.tax_year != self.tax_year || input.filing_status != self.filing_status {
            return Err(TaxEngineError::UnknownFilingStatus {
                tax_year: input.period.tax_year,
                filing_status: input.filing_status,
            });
        }
        input.validate()?;

        let net_profit = input.gross_income - input.total_deductions;
        if net_profit < Decimal::ZERO {
            debug!(
                owner = input.owner_id,
                net_profit = %net_profit,
                "period closed at a loss; no tax due"
            );
        }

        let se = self.se_tax.calculate(net_profit);
        let taxable_income = max(max(net_profit, Decimal::ZERO) - se.se_tax_deduction, Decimal::ZERO);
        let income_tax = self.income_tax.calculate(taxable_income);
        let total_tax_liability = se.self_employment_tax + income_tax;

        let quarterly_payment = match input.period.quarter {
            Some(_) => total_tax_liability,
            None => total_tax_liability / QUARTERS_PER_YEAR,
        };

        let effective_tax_rate = if input.gross_income > Decimal::ZERO {
            Some(total_tax_liability / input.gross_income)
        } else {
            None
        };

        if input.prior_withholding > total_tax_liability {
            warn!(
                owner = input.owner_id,
                withholding = %input.prior_withholding,
                liability = %total_tax_liability,
                "prior withholding exceeds liability; nothing remains owed"
            );
        }

        Ok(TaxEstimate {
            owner_id: input.owner_id,
            tax_year: input.period.tax_year,
            quarter: input.period.quarter,
            filing_status: input.filing_status,
            period_start: input.period.start,
            period_end: input.period.end,
            gross_income: input.gross_income,
            income_by_platform: input.income_by_platform.clone(),
            total_deductions: input.total_deductions,
            deductions_by_category: input.deductions_by_category.clone(),
            net_profit,
            se_taxable_income: se.se_taxable_income,
            self_employment_tax: se.self_employment_tax,
            se_tax_deduction: se.se_tax_deduction,
            taxable_income,
            income_tax,
            effective_tax_rate,
            prior_withholding: input.prior_withholding,
            total_tax_liability,
            quarterly_payment,
            status: CalculationStatus::Current,
            calculated_at,
        })
    }
}
