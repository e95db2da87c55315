//! Progressive income tax over a [`BracketTable`].
//!
//! Each bracket taxes the slice of income between its lower bound and the
//! next bracket's lower bound. Income exactly equal to a bound is fully
//! taxed at the lower bracket's rate; only income strictly above the bound
//! enters the next bracket.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use tax_core::calculations::IncomeTaxCalculator;
//! use tax_core::{Bracket, BracketTable, FilingStatusCode};
//!
//! let table = BracketTable::new(
//!     2025,
//!     FilingStatusCode::Single,
//!     vec![
//!         Bracket { lower_bound: dec!(0), rate: dec!(0.10) },
//!         Bracket { lower_bound: dec!(11925), rate: dec!(0.12) },
//!         Bracket { lower_bound: dec!(48475), rate: dec!(0.22) },
//!     ],
//! )
//! .unwrap();
//!
//! let tax = IncomeTaxCalculator::new(&table).calculate(dec!(20000));
//!
//! // 11925 × 10% + (20000 − 11925) × 12%
//! assert_eq!(tax, dec!(2161.50));
//! ```

use rust_decimal::Decimal;
use tracing::debug;

use crate::error::TaxEngineError;
use crate::models::{BracketTable, FilingStatusCode, TaxBracketSchedule};

/// Applies one bracket table to taxable income.
#[derive(Debug, Clone, Copy)]
pub struct IncomeTaxCalculator<'a> {
    table: &'a BracketTable,
}

impl<'a> IncomeTaxCalculator<'a> {
    pub fn new(table: &'a BracketTable) -> Self {
        Self { table }
    }

    /// Marginal-bracket tax on `taxable_income`; zero when it is zero or less.
    pub fn calculate(
        &self,
        taxable_income: Decimal,
    ) -> Decimal {
        if taxable_income <= Decimal::ZERO {
            debug!(taxable_income = %taxable_income, "no taxable income; income tax is zero");
            return Decimal::ZERO;
        }

        self.table
            .slices()
            .take_while(|(bracket, _)| taxable_income > bracket.lower_bound)
            .map(|(bracket, upper)| {
                let top = upper.map_or(taxable_income, |upper| taxable_income.min(upper));
                (top - bracket.lower_bound) * bracket.rate
            })
            .sum()
    }

    /// The rate applied to the last dollar of `taxable_income`.
    pub fn marginal_rate(
        &self,
        taxable_income: Decimal,
    ) -> Decimal {
        self.table
            .slices()
            .take_while(|(bracket, _)| taxable_income > bracket.lower_bound)
            .last()
            .map_or(Decimal::ZERO, |(bracket, _)| bracket.rate)
    }
}

/// Looks up the table for `filing_status` in `schedule` and applies it.
///
/// # Errors
///
/// Returns [`TaxEngineError::UnknownFilingStatus`] when the schedule holds
/// no table for the (tax year, filing status) pair.
pub fn calculate_income_tax(
    taxable_income: Decimal,
    tax_year: i32,
    filing_status: FilingStatusCode,
    schedule: &TaxBracketSchedule,
) -> Result<Decimal, TaxEngineError> {
    let table = schedule
        .get(tax_year, filing_status)
        .ok_or(TaxEngineError::UnknownFilingStatus {
            tax_year,
            filing_status,
        })?;
    Ok(IncomeTaxCalculator::new(table).calculate(taxable_income))
}
