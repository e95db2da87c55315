use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::FilingStatusCode;

/// A stored bracket row in IRS rate-schedule form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxBracket {
    pub tax_year: i32,
    pub filing_status_id: i32,
    pub min_income: Decimal,
    pub max_income: Option<Decimal>,
    pub tax_rate: Decimal,
    pub base_tax: Decimal,
}

/// Errors raised while assembling a [`BracketTable`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BracketTableError {
    #[error("bracket table is empty")]
    Empty,

    #[error("first bracket must start at 0, got {0}")]
    FirstBoundNotZero(Decimal),

    #[error("bracket lower bounds must strictly increase: {previous} then {next}")]
    NotAscending { previous: Decimal, next: Decimal },

    #[error("bracket rate must be between 0 and 1, got {0}")]
    InvalidRate(Decimal),

    #[error("bracket ending at {max_income} is followed by one starting at {next_min}")]
    NotContiguous { max_income: Decimal, next_min: Decimal },

    #[error("only the top bracket may be open ended, but the one from {min_income} is")]
    OpenBracketNotLast { min_income: Decimal },

    #[error("top bracket must be open ended, got max {max_income}")]
    TopBracketBounded { max_income: Decimal },
}

/// One `(lower_bound, rate)` pair of a progressive table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bracket {
    pub lower_bound: Decimal,
    pub rate: Decimal,
}

/// Ordered progressive brackets for a single (tax year, filing status).
///
/// Lower bounds strictly increase from zero; the last bracket is open ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketTable {
    tax_year: i32,
    filing_status: FilingStatusCode,
    brackets: Vec<Bracket>,
}

impl BracketTable {
    pub fn new(
        tax_year: i32,
        filing_status: FilingStatusCode,
        brackets: Vec<Bracket>,
    ) -> Result<Self, BracketTableError> {
        let first = brackets.first().ok_or(BracketTableError::Empty)?;
        if !first.lower_bound.is_zero() {
            return Err(BracketTableError::FirstBoundNotZero(first.lower_bound));
        }
        for pair in brackets.windows(2) {
            if pair[1].lower_bound <= pair[0].lower_bound {
                return Err(BracketTableError::NotAscending {
                    previous: pair[0].lower_bound,
                    next: pair[1].lower_bound,
                });
            }
        }
        if let Some(bad) = brackets
            .iter()
            .find(|b| b.rate < Decimal::ZERO || b.rate > Decimal::ONE)
        {
            return Err(BracketTableError::InvalidRate(bad.rate));
        }

        Ok(Self {
            tax_year,
            filing_status,
            brackets,
        })
    }

    /// Builds a table from stored rows. Each row's `max_income` must equal
    /// the next row's `min_income` and only the top row may leave it empty.
    /// `base_tax` is not read; it is implied by the slices below each bound.
    pub fn from_brackets(
        tax_year: i32,
        filing_status: FilingStatusCode,
        rows: &[TaxBracket],
    ) -> Result<Self, BracketTableError> {
        let mut sorted: Vec<&TaxBracket> = rows.iter().collect();
        sorted.sort_by(|a, b| a.min_income.cmp(&b.min_income));

        let brackets = sorted
            .iter()
            .map(|row| Bracket {
                lower_bound: row.min_income,
                rate: row.tax_rate,
            })
            .collect();
        let table = Self::new(tax_year, filing_status, brackets)?;

        for pair in sorted.windows(2) {
            match pair[0].max_income {
                Some(max_income) if max_income != pair[1].min_income => {
                    return Err(BracketTableError::NotContiguous {
                        max_income,
                        next_min: pair[1].min_income,
                    });
                }
                Some(_) => {}
                None => {
                    return Err(BracketTableError::OpenBracketNotLast {
                        min_income: pair[0].min_income,
                    });
                }
            }
        }
        if let Some(max_income) = sorted.last().and_then(|top| top.max_income) {
            return Err(BracketTableError::TopBracketBounded { max_income });
        }

        Ok(table)
    }

    pub fn tax_year(&self) -> i32 {
        self.tax_year
    }

    pub fn filing_status(&self) -> FilingStatusCode {
        self.filing_status
    }

    pub fn brackets(&self) -> &[Bracket] {
        &self.brackets
    }

    /// Each bracket paired with the next bracket's lower bound (its upper
    /// limit), `None` for the open-ended top bracket.
    pub fn slices(&self) -> impl Iterator<Item = (&Bracket, Option<Decimal>)> + '_ {
        self.brackets.iter().enumerate().map(|(i, bracket)| {
            let upper = self.brackets.get(i + 1).map(|next| next.lower_bound);
            (bracket, upper)
        })
    }
}

/// Every filing status' bracket table for one tax year.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxBracketSchedule {
    tables: BTreeMap<FilingStatusCode, BracketTable>,
}

impl TaxBracketSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table, replacing any table already held for its filing status.
    pub fn insert(
        &mut self,
        table: BracketTable,
    ) {
        self.tables.insert(table.filing_status, table);
    }

    pub fn with_table(
        mut self,
        table: BracketTable,
    ) -> Self {
        self.insert(table);
        self
    }

    pub fn get(
        &self,
        tax_year: i32,
        filing_status: FilingStatusCode,
    ) -> Option<&BracketTable> {
        self.tables
            .get(&filing_status)
            .filter(|table| table.tax_year == tax_year)
    }
}
