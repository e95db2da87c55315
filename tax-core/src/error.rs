//! Engine-level error taxonomy.
//!
//! Ordinary edge cases (zero or negative profit, zero income) are valid
//! domain states and never surface here. Only out-of-contract inputs and
//! storage failures do, each carrying the offending field so callers can
//! build user-facing messages without parsing strings.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::models::{BracketTableError, FilingStatusCode, PeriodError, TaxYearConfigError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaxEngineError {
    /// A non-positive payment or platform amount, or a negative figure where
    /// a non-negative one is required.
    #[error("invalid amount for {field}: {value}")]
    InvalidAmount { field: String, value: Decimal },

    #[error("invalid period: {0}")]
    InvalidPeriod(#[from] PeriodError),

    /// No bracket table for the status/year pair.
    #[error("no bracket table for filing status {filing_status} in tax year {tax_year}")]
    UnknownFilingStatus {
        tax_year: i32,
        filing_status: FilingStatusCode,
    },

    /// No configuration row for the tax year.
    #[error("no configuration for tax year {tax_year}")]
    UnknownTaxYear { tax_year: i32 },

    /// A breakdown whose sum disagrees with its aggregate beyond tolerance.
    #[error("{field} breakdown sums to {breakdown_sum}, expected {total}")]
    InconsistentTotals {
        field: String,
        total: Decimal,
        breakdown_sum: Decimal,
    },

    #[error("invalid tax year configuration: {0}")]
    InvalidConfig(#[from] TaxYearConfigError),

    #[error("invalid bracket table: {0}")]
    InvalidBracketTable(#[from] BracketTableError),

    /// Storage failures are passed through unmodified.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl TaxEngineError {
    pub(crate) fn invalid_amount(
        field: impl Into<String>,
        value: Decimal,
    ) -> Self {
        Self::InvalidAmount {
            field: field.into(),
            value,
        }
    }
}
