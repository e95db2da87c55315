use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    EstimatedPayment, FilingStatus, FilingStatusCode, IncomeThreshold, NewEstimatedPayment,
    Quarter, TaxBracket, TaxDeadline, TaxEstimate, TaxYearConfig,
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Record not found")]
    NotFound,

    /// An optimistic write lost a race; the caller should reload and retry.
    #[error("Concurrent update of {entity}: expected version {expected_version}")]
    Conflict {
        entity: &'static str,
        expected_version: i64,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

#[async_trait]
pub trait TaxRepository: Send + Sync {
    // Tax year config
    async fn get_tax_year_config(
        &self,
        year: i32,
    ) -> Result<TaxYearConfig, RepositoryError>;
    async fn list_tax_years(&self) -> Result<Vec<i32>, RepositoryError>;

    // Filing status
    async fn get_filing_status(
        &self,
        id: i32,
    ) -> Result<FilingStatus, RepositoryError>;
    async fn get_filing_status_by_code(
        &self,
        code: FilingStatusCode,
    ) -> Result<FilingStatus, RepositoryError>;
    async fn list_filing_statuses(&self) -> Result<Vec<FilingStatus>, RepositoryError>;

    // Tax brackets
    async fn get_tax_brackets(
        &self,
        tax_year: i32,
        filing_status_id: i32,
    ) -> Result<Vec<TaxBracket>, RepositoryError>;
    async fn insert_tax_bracket(
        &self,
        bracket: &TaxBracket,
    ) -> Result<(), RepositoryError>;
    async fn delete_tax_brackets(
        &self,
        tax_year: i32,
        filing_status_id: i32,
    ) -> Result<(), RepositoryError>;
    /// Swaps the whole table for `(tax_year, filing_status_id)` in one unit.
    /// On error the previous table is still in place. Returns the row count.
    async fn replace_tax_brackets(
        &self,
        tax_year: i32,
        filing_status_id: i32,
        brackets: &[TaxBracket],
    ) -> Result<usize, RepositoryError>;

    // Tax estimates, one per (owner, tax year, quarter); `None` is the annual/YTD slot
    /// Inserts or replaces the estimate in its slot.
    async fn save_estimate(
        &self,
        estimate: &TaxEstimate,
    ) -> Result<(), RepositoryError>;
    async fn get_estimate(
        &self,
        owner_id: i64,
        tax_year: i32,
        quarter: Option<Quarter>,
    ) -> Result<TaxEstimate, RepositoryError>;
    async fn list_estimates(
        &self,
        owner_id: i64,
        tax_year: Option<i32>,
    ) -> Result<Vec<TaxEstimate>, RepositoryError>;
    /// Flags every `current` estimate for the owner and year as stale.
    /// Manual overrides are left alone. Returns the number of rows changed.
    async fn mark_estimates_stale(
        &self,
        owner_id: i64,
        tax_year: i32,
    ) -> Result<u64, RepositoryError>;
    async fn delete_estimate(
        &self,
        owner_id: i64,
        tax_year: i32,
        quarter: Option<Quarter>,
    ) -> Result<(), RepositoryError>;

    // Income threshold
    async fn get_income_threshold(
        &self,
        owner_id: i64,
        tax_year: i32,
    ) -> Result<IncomeThreshold, RepositoryError>;
    /// Stores `threshold` if its `version` still matches the stored row
    /// (0 for a first insert) and returns it with the version advanced.
    ///
    /// # Errors
    /// [`RepositoryError::Conflict`] when another writer got there first.
    async fn save_income_threshold(
        &self,
        threshold: &IncomeThreshold,
    ) -> Result<IncomeThreshold, RepositoryError>;

    // Estimated payments
    async fn create_payment(
        &self,
        payment: NewEstimatedPayment,
    ) -> Result<EstimatedPayment, RepositoryError>;
    async fn list_payments(
        &self,
        owner_id: i64,
        tax_year: i32,
    ) -> Result<Vec<EstimatedPayment>, RepositoryError>;
    async fn delete_payment(
        &self,
        id: i64,
    ) -> Result<(), RepositoryError>;

    // Tax deadlines
    /// Inserts or replaces deadlines keyed by (tax year, quarter).
    async fn save_deadlines(
        &self,
        deadlines: &[TaxDeadline],
    ) -> Result<(), RepositoryError>;
    async fn list_deadlines(
        &self,
        tax_year: i32,
    ) -> Result<Vec<TaxDeadline>, RepositoryError>;
}
