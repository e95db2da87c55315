//! Owner-facing operations over a [`TaxRepository`].
//!
//! The engine loads year-keyed configuration and bracket tables from the
//! repository, runs the pure calculators, and persists results. It never
//! reads the system clock: every time-sensitive call takes the reference
//! date or timestamp explicitly.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::calculations::{
    EstimateInput, QuarterlyEstimateCalculator, QuarterlyRequirementAssessment,
    assess_with_threshold,
};
use crate::db::{RepositoryError, TaxRepository};
use crate::error::TaxEngineError;
use crate::models::{
    BracketTable, CalculationStatus, DeadlineStatus, EstimatedPayment, FilingStatusCode,
    IncomeThreshold, NewEstimatedPayment, Quarter, TaxDeadline, TaxEstimate, TaxYearConfig,
};
use crate::schedule::{DeadlineScheduler, HolidayCalendar, UsFederalHolidays, deadline_status};
use crate::tracking::{PaymentLedger, ThresholdMarks, ThresholdTracker, remaining_owed, sum_payments};

/// Everything an owner sees for one estimate request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarterlySummary {
    pub estimate: TaxEstimate,
    pub assessment: QuarterlyRequirementAssessment,
    pub total_paid: Decimal,
    pub remaining_owed: Decimal,
    pub next_deadline: Option<DeadlineStatus>,
}

pub struct TaxEngine<'a, C = UsFederalHolidays> {
    repository: &'a dyn TaxRepository,
    scheduler: DeadlineScheduler<C>,
}

impl<'a> TaxEngine<'a> {
    pub fn new(repository: &'a dyn TaxRepository) -> Self {
        Self::with_calendar(repository, UsFederalHolidays::default())
    }
}

impl<'a, C: HolidayCalendar> TaxEngine<'a, C> {
    pub fn with_calendar(
        repository: &'a dyn TaxRepository,
        calendar: C,
    ) -> Self {
        Self {
            repository,
            scheduler: DeadlineScheduler::new(calendar),
        }
    }

    pub fn repository(&self) -> &'a dyn TaxRepository {
        self.repository
    }

    // ─── configuration ───

    /// Stored configuration for `tax_year`, validated.
    pub async fn tax_year_config(
        &self,
        tax_year: i32,
    ) -> Result<TaxYearConfig, TaxEngineError> {
        let config = match self.repository.get_tax_year_config(tax_year).await {
            Ok(config) => config,
            Err(RepositoryError::NotFound) => return Err(TaxEngineError::UnknownTaxYear { tax_year }),
            Err(e) => return Err(e.into()),
        };
        config.validate()?;
        Ok(config)
    }

    pub async fn bracket_table(
        &self,
        tax_year: i32,
        filing_status: FilingStatusCode,
    ) -> Result<BracketTable, TaxEngineError> {
        let unknown = TaxEngineError::UnknownFilingStatus {
            tax_year,
            filing_status,
        };
        let status = match self.repository.get_filing_status_by_code(filing_status).await {
            Ok(status) => status,
            Err(RepositoryError::NotFound) => return Err(unknown),
            Err(e) => return Err(e.into()),
        };
        let rows = self.repository.get_tax_brackets(tax_year, status.id).await?;
        if rows.is_empty() {
            return Err(unknown);
        }
        Ok(BracketTable::from_brackets(tax_year, filing_status, &rows)?)
    }

    /// Platform marks for `tax_year`, falling back to current law when the
    /// year has no stored configuration.
    async fn threshold_marks(
        &self,
        tax_year: i32,
    ) -> Result<ThresholdMarks, TaxEngineError> {
        match self.tax_year_config(tax_year).await {
            Ok(config) => Ok(ThresholdMarks::from_tax_year_config(&config)),
            Err(TaxEngineError::UnknownTaxYear { .. }) => {
                debug!(tax_year, "no stored configuration; using current-law platform marks");
                Ok(ThresholdMarks::default())
            }
            Err(e) => Err(e),
        }
    }

    // ─── estimates ───

    /// Calculates and stores the estimate for `input`, replacing any earlier
    /// estimate for the same owner, year and quarter.
    #[instrument(skip_all, fields(owner_id = input.owner_id, tax_year = input.period.tax_year, quarter = ?input.period.quarter))]
    pub async fn calculate_estimate(
        &self,
        input: &EstimateInput,
        calculated_at: DateTime<Utc>,
    ) -> Result<TaxEstimate, TaxEngineError> {
        let (estimate, _) = self.calculate_and_store(input, calculated_at).await?;
        Ok(estimate)
    }

    /// The stored estimate along with the configuration it was computed under.
    async fn calculate_and_store(
        &self,
        input: &EstimateInput,
        calculated_at: DateTime<Utc>,
    ) -> Result<(TaxEstimate, TaxYearConfig), TaxEngineError> {
        let tax_year = input.period.tax_year;
        let config = self.tax_year_config(tax_year).await?;
        let table = self.bracket_table(tax_year, input.filing_status).await?;

        let estimate = QuarterlyEstimateCalculator::new(&config, &table).calculate(input, calculated_at)?;
        self.repository.save_estimate(&estimate).await?;

        info!(
            liability = %estimate.total_tax_liability,
            quarterly_payment = %estimate.quarterly_payment,
            "estimate calculated"
        );
        Ok((estimate, config))
    }

    /// Whether quarterly payments are required for `projected_total_tax_liability`,
    /// using the year's configured threshold.
    pub async fn assess_quarterly_requirement(
        &self,
        tax_year: i32,
        projected_total_tax_liability: Decimal,
    ) -> Result<QuarterlyRequirementAssessment, TaxEngineError> {
        let config = self.tax_year_config(tax_year).await?;
        Ok(assess_with_threshold(
            projected_total_tax_liability,
            config.quarterly_payment_threshold,
        ))
    }

    /// Calculates the estimate and pairs it with the requirement assessment,
    /// payments so far and the next deadline as seen from `today`.
    pub async fn quarterly_summary(
        &self,
        input: &EstimateInput,
        today: NaiveDate,
        calculated_at: DateTime<Utc>,
    ) -> Result<QuarterlySummary, TaxEngineError> {
        let (estimate, config) = self.calculate_and_store(input, calculated_at).await?;
        let assessment =
            assess_with_threshold(estimate.total_tax_liability, config.quarterly_payment_threshold);

        let total_paid = self
            .total_paid(estimate.owner_id, estimate.tax_year, estimate.quarter)
            .await?;
        let next_deadline = self.next_deadline(estimate.owner_id, today).await?;

        Ok(QuarterlySummary {
            remaining_owed: remaining_owed(&estimate, total_paid),
            estimate,
            assessment,
            total_paid,
            next_deadline,
        })
    }

    pub async fn estimate(
        &self,
        owner_id: i64,
        tax_year: i32,
        quarter: Option<Quarter>,
    ) -> Result<TaxEstimate, TaxEngineError> {
        Ok(self.repository.get_estimate(owner_id, tax_year, quarter).await?)
    }

    /// Replaces the suggested quarterly payment with an owner-chosen amount.
    ///
    /// # Errors
    /// [`TaxEngineError::InvalidAmount`] for a negative amount; a missing
    /// estimate surfaces as [`RepositoryError::NotFound`].
    #[instrument(skip(self))]
    pub async fn override_quarterly_payment(
        &self,
        owner_id: i64,
        tax_year: i32,
        quarter: Option<Quarter>,
        quarterly_payment: Decimal,
    ) -> Result<TaxEstimate, TaxEngineError> {
        if quarterly_payment < Decimal::ZERO {
            return Err(TaxEngineError::invalid_amount("quarterly_payment", quarterly_payment));
        }

        let mut estimate = self.repository.get_estimate(owner_id, tax_year, quarter).await?;
        estimate.quarterly_payment = quarterly_payment;
        estimate.status = CalculationStatus::ManualOverride;
        self.repository.save_estimate(&estimate).await?;

        info!("quarterly payment manually overridden");
        Ok(estimate)
    }

    // ─── platform income ───

    /// Adds platform income to the running total and marks the owner's
    /// estimates for the year stale.
    ///
    /// Estimates are marked stale before the total is written, so an error
    /// never leaves the income counted and the call can be retried.
    pub async fn record_platform_income(
        &self,
        owner_id: i64,
        tax_year: i32,
        platform: &str,
        amount: Decimal,
        recorded_at: DateTime<Utc>,
    ) -> Result<IncomeThreshold, TaxEngineError> {
        let marks = self.threshold_marks(tax_year).await?;
        self.mark_stale(owner_id, tax_year).await?;
        ThresholdTracker::new(self.repository, marks)
            .record_platform_income(owner_id, tax_year, platform, amount, recorded_at)
            .await
    }

    /// Reverses previously recorded platform income. Flags stay set.
    pub async fn remove_platform_income(
        &self,
        owner_id: i64,
        tax_year: i32,
        platform: &str,
        amount: Decimal,
    ) -> Result<IncomeThreshold, TaxEngineError> {
        let marks = self.threshold_marks(tax_year).await?;
        self.mark_stale(owner_id, tax_year).await?;
        ThresholdTracker::new(self.repository, marks)
            .remove_platform_income(owner_id, tax_year, platform, amount)
            .await
    }

    pub async fn threshold_status(
        &self,
        owner_id: i64,
        tax_year: i32,
    ) -> Result<IncomeThreshold, TaxEngineError> {
        let marks = self.threshold_marks(tax_year).await?;
        ThresholdTracker::new(self.repository, marks)
            .status(owner_id, tax_year)
            .await
    }

    async fn mark_stale(
        &self,
        owner_id: i64,
        tax_year: i32,
    ) -> Result<(), TaxEngineError> {
        let changed = self.repository.mark_estimates_stale(owner_id, tax_year).await?;
        if changed > 0 {
            debug!(owner_id, tax_year, changed, "estimates marked stale");
        }
        Ok(())
    }

    // ─── payments ───

    pub async fn record_payment(
        &self,
        payment: NewEstimatedPayment,
    ) -> Result<EstimatedPayment, TaxEngineError> {
        PaymentLedger::new(self.repository).record_payment(payment).await
    }

    pub async fn payments(
        &self,
        owner_id: i64,
        tax_year: i32,
    ) -> Result<Vec<EstimatedPayment>, TaxEngineError> {
        PaymentLedger::new(self.repository).payments(owner_id, tax_year).await
    }

    pub async fn total_paid(
        &self,
        owner_id: i64,
        tax_year: i32,
        quarter: Option<Quarter>,
    ) -> Result<Decimal, TaxEngineError> {
        PaymentLedger::new(self.repository)
            .total_paid(owner_id, tax_year, quarter)
            .await
    }

    // ─── deadlines ───

    /// The four deadlines for `tax_year`, stored as reference data.
    pub async fn deadlines(
        &self,
        tax_year: i32,
    ) -> Result<Vec<TaxDeadline>, TaxEngineError> {
        let deadlines = self.scheduler.deadlines(tax_year)?;
        self.repository.save_deadlines(&deadlines).await?;
        Ok(deadlines)
    }

    /// Each of the year's deadlines viewed from `today` for `owner_id`.
    pub async fn deadline_statuses(
        &self,
        owner_id: i64,
        tax_year: i32,
        today: NaiveDate,
    ) -> Result<Vec<DeadlineStatus>, TaxEngineError> {
        let payments = self.payments(owner_id, tax_year).await?;
        Ok(self
            .deadlines(tax_year)
            .await?
            .into_iter()
            .map(|deadline| {
                let paid = sum_payments(&payments, Some(deadline.quarter));
                deadline_status(deadline, today, paid)
            })
            .collect())
    }

    /// The nearest deadline on or after `today`.
    ///
    /// Looks at the previous tax year (its Q4 falls due in January) and the
    /// current one. After the current year's Q4 has passed, callers ask
    /// again once the calendar year turns.
    pub async fn next_deadline(
        &self,
        owner_id: i64,
        today: NaiveDate,
    ) -> Result<Option<DeadlineStatus>, TaxEngineError> {
        let years = [today.year() - 1, today.year()];
        let Some(deadline) = self.scheduler.next_deadline(today, &years)? else {
            return Ok(None);
        };
        let paid = self
            .total_paid(owner_id, deadline.tax_year, Some(deadline.quarter))
            .await?;
        Ok(Some(deadline_status(deadline, today, paid)))
    }
}
