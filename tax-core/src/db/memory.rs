//! In-process [`TaxRepository`] for unit tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal_macros::dec;

use super::repository::{RepositoryError, TaxRepository};
use crate::models::{
    CalculationStatus, EstimatedPayment, FilingStatus, FilingStatusCode, IncomeThreshold,
    NewEstimatedPayment, Quarter, TaxBracket, TaxDeadline, TaxEstimate, TaxYearConfig,
};

type EstimateKey = (i64, i32, Option<Quarter>);

#[derive(Default)]
struct State {
    configs: BTreeMap<i32, TaxYearConfig>,
    brackets: Vec<TaxBracket>,
    estimates: BTreeMap<EstimateKey, TaxEstimate>,
    thresholds: HashMap<(i64, i32), IncomeThreshold>,
    payments: Vec<EstimatedPayment>,
    deadlines: BTreeMap<(i32, Quarter), TaxDeadline>,
}

#[derive(Default)]
pub(crate) struct InMemoryRepository {
    state: Mutex<State>,
    fail_stale_marking: AtomicBool,
    config_reads: AtomicUsize,
}

impl InMemoryRepository {
    /// Seeded with 2025 current-law config and the Schedule X single table.
    pub(crate) fn with_2025_single() -> Self {
        let repo = Self::default();
        {
            let mut state = repo.state.lock().unwrap();
            state.configs.insert(2025, TaxYearConfig::current_law(2025));
            let rows = [
                (dec!(0), Some(dec!(11925)), dec!(0.10), dec!(0)),
                (dec!(11925), Some(dec!(48475)), dec!(0.12), dec!(1192.50)),
                (dec!(48475), Some(dec!(103350)), dec!(0.22), dec!(5578.50)),
                (dec!(103350), Some(dec!(197300)), dec!(0.24), dec!(17651)),
                (dec!(197300), Some(dec!(250525)), dec!(0.32), dec!(40199)),
                (dec!(250525), Some(dec!(626350)), dec!(0.35), dec!(57231)),
                (dec!(626350), None, dec!(0.37), dec!(188769.75)),
            ];
            state.brackets = rows
                .into_iter()
                .map(|(min_income, max_income, tax_rate, base_tax)| TaxBracket {
                    tax_year: 2025,
                    filing_status_id: 1,
                    min_income,
                    max_income,
                    tax_rate,
                    base_tax,
                })
                .collect();
        }
        repo
    }

    /// Makes `mark_estimates_stale` return a database error until cleared.
    pub(crate) fn fail_stale_marking(
        &self,
        fail: bool,
    ) {
        self.fail_stale_marking.store(fail, Ordering::SeqCst);
    }

    /// How many times `get_tax_year_config` has been called.
    pub(crate) fn config_reads(&self) -> usize {
        self.config_reads.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, RepositoryError> {
        self.state
            .lock()
            .map_err(|e| RepositoryError::Database(e.to_string()))
    }
}

fn filing_status(code: FilingStatusCode) -> FilingStatus {
    let id = FilingStatusCode::ALL
        .iter()
        .position(|c| *c == code)
        .map_or(0, |i| i as i32 + 1);
    FilingStatus {
        id,
        status_code: code,
        status_name: code.name().to_string(),
    }
}

/// A fully populated estimate for round-trip style assertions.
pub(crate) fn sample_estimate(
    owner_id: i64,
    tax_year: i32,
    quarter: Option<Quarter>,
) -> TaxEstimate {
    TaxEstimate {
        owner_id,
        tax_year,
        quarter,
        filing_status: FilingStatusCode::Single,
        period_start: NaiveDate::from_ymd_opt(tax_year, 1, 1).unwrap(),
        period_end: NaiveDate::from_ymd_opt(tax_year, 12, 31).unwrap(),
        gross_income: dec!(20000),
        income_by_platform: BTreeMap::from([("Uber".to_string(), dec!(20000))]),
        total_deductions: dec!(5000),
        deductions_by_category: BTreeMap::new(),
        net_profit: dec!(15000),
        se_taxable_income: dec!(13852.5),
        self_employment_tax: dec!(2119.4325),
        se_tax_deduction: dec!(1059.71625),
        taxable_income: dec!(13940.28375),
        income_tax: dec!(1434.33405),
        effective_tax_rate: Some(dec!(0.1776883275)),
        prior_withholding: dec!(0),
        total_tax_liability: dec!(3553.76655),
        quarterly_payment: dec!(888.4416375),
        status: CalculationStatus::Current,
        calculated_at: Utc.with_ymd_and_hms(tax_year, 6, 30, 9, 0, 0).unwrap(),
    }
}

#[async_trait]
impl TaxRepository for InMemoryRepository {
    async fn get_tax_year_config(
        &self,
        year: i32,
    ) -> Result<TaxYearConfig, RepositoryError> {
        self.config_reads.fetch_add(1, Ordering::SeqCst);
        self.lock()?
            .configs
            .get(&year)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn list_tax_years(&self) -> Result<Vec<i32>, RepositoryError> {
        Ok(self.lock()?.configs.keys().rev().copied().collect())
    }

    async fn get_filing_status(
        &self,
        id: i32,
    ) -> Result<FilingStatus, RepositoryError> {
        FilingStatusCode::ALL
            .into_iter()
            .map(filing_status)
            .find(|s| s.id == id)
            .ok_or(RepositoryError::NotFound)
    }

    async fn get_filing_status_by_code(
        &self,
        code: FilingStatusCode,
    ) -> Result<FilingStatus, RepositoryError> {
        Ok(filing_status(code))
    }

    async fn list_filing_statuses(&self) -> Result<Vec<FilingStatus>, RepositoryError> {
        Ok(FilingStatusCode::ALL.into_iter().map(filing_status).collect())
    }

    async fn get_tax_brackets(
        &self,
        tax_year: i32,
        filing_status_id: i32,
    ) -> Result<Vec<TaxBracket>, RepositoryError> {
        Ok(self
            .lock()?
            .brackets
            .iter()
            .filter(|b| b.tax_year == tax_year && b.filing_status_id == filing_status_id)
            .cloned()
            .collect())
    }

    async fn insert_tax_bracket(
        &self,
        bracket: &TaxBracket,
    ) -> Result<(), RepositoryError> {
        self.lock()?.brackets.push(bracket.clone());
        Ok(())
    }

    async fn delete_tax_brackets(
        &self,
        tax_year: i32,
        filing_status_id: i32,
    ) -> Result<(), RepositoryError> {
        self.lock()?
            .brackets
            .retain(|b| !(b.tax_year == tax_year && b.filing_status_id == filing_status_id));
        Ok(())
    }

    async fn replace_tax_brackets(
        &self,
        tax_year: i32,
        filing_status_id: i32,
        brackets: &[TaxBracket],
    ) -> Result<usize, RepositoryError> {
        let mut state = self.lock()?;
        state
            .brackets
            .retain(|b| !(b.tax_year == tax_year && b.filing_status_id == filing_status_id));
        state.brackets.extend(brackets.iter().map(|b| TaxBracket {
            tax_year,
            filing_status_id,
            ..b.clone()
        }));
        Ok(brackets.len())
    }

    async fn save_estimate(
        &self,
        estimate: &TaxEstimate,
    ) -> Result<(), RepositoryError> {
        self.lock()?.estimates.insert(
            (estimate.owner_id, estimate.tax_year, estimate.quarter),
            estimate.clone(),
        );
        Ok(())
    }

    async fn get_estimate(
        &self,
        owner_id: i64,
        tax_year: i32,
        quarter: Option<Quarter>,
    ) -> Result<TaxEstimate, RepositoryError> {
        self.lock()?
            .estimates
            .get(&(owner_id, tax_year, quarter))
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn list_estimates(
        &self,
        owner_id: i64,
        tax_year: Option<i32>,
    ) -> Result<Vec<TaxEstimate>, RepositoryError> {
        Ok(self
            .lock()?
            .estimates
            .values()
            .filter(|e| e.owner_id == owner_id && tax_year.is_none_or(|y| e.tax_year == y))
            .cloned()
            .collect())
    }

    async fn mark_estimates_stale(
        &self,
        owner_id: i64,
        tax_year: i32,
    ) -> Result<u64, RepositoryError> {
        if self.fail_stale_marking.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database("stale marking unavailable".to_string()));
        }
        let mut changed = 0;
        for estimate in self.lock()?.estimates.values_mut() {
            if estimate.owner_id == owner_id
                && estimate.tax_year == tax_year
                && estimate.status == CalculationStatus::Current
            {
                estimate.status = CalculationStatus::Stale;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn delete_estimate(
        &self,
        owner_id: i64,
        tax_year: i32,
        quarter: Option<Quarter>,
    ) -> Result<(), RepositoryError> {
        self.lock()?
            .estimates
            .remove(&(owner_id, tax_year, quarter))
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    async fn get_income_threshold(
        &self,
        owner_id: i64,
        tax_year: i32,
    ) -> Result<IncomeThreshold, RepositoryError> {
        self.lock()?
            .thresholds
            .get(&(owner_id, tax_year))
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn save_income_threshold(
        &self,
        threshold: &IncomeThreshold,
    ) -> Result<IncomeThreshold, RepositoryError> {
        let mut state = self.lock()?;
        let key = (threshold.owner_id, threshold.tax_year);
        let stored_version = state.thresholds.get(&key).map_or(0, |t| t.version);
        if stored_version != threshold.version {
            return Err(RepositoryError::Conflict {
                entity: "income_threshold",
                expected_version: threshold.version,
            });
        }
        let saved = IncomeThreshold {
            version: threshold.version + 1,
            ..threshold.clone()
        };
        state.thresholds.insert(key, saved.clone());
        Ok(saved)
    }

    async fn create_payment(
        &self,
        payment: NewEstimatedPayment,
    ) -> Result<EstimatedPayment, RepositoryError> {
        let mut state = self.lock()?;
        let stored = EstimatedPayment {
            id: state.payments.len() as i64 + 1,
            owner_id: payment.owner_id,
            tax_year: payment.tax_year,
            quarter: payment.quarter,
            payment_date: payment.payment_date,
            amount: payment.amount,
            method: payment.method,
            confirmation_number: payment.confirmation_number,
            notes: payment.notes,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        };
        state.payments.push(stored.clone());
        Ok(stored)
    }

    async fn list_payments(
        &self,
        owner_id: i64,
        tax_year: i32,
    ) -> Result<Vec<EstimatedPayment>, RepositoryError> {
        let mut payments: Vec<_> = self
            .lock()?
            .payments
            .iter()
            .filter(|p| p.owner_id == owner_id && p.tax_year == tax_year)
            .cloned()
            .collect();
        payments.sort_by_key(|p| (p.payment_date, p.id));
        Ok(payments)
    }

    async fn delete_payment(
        &self,
        id: i64,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        let before = state.payments.len();
        state.payments.retain(|p| p.id != id);
        if state.payments.len() == before {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn save_deadlines(
        &self,
        deadlines: &[TaxDeadline],
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        for deadline in deadlines {
            state
                .deadlines
                .insert((deadline.tax_year, deadline.quarter), deadline.clone());
        }
        Ok(())
    }

    async fn list_deadlines(
        &self,
        tax_year: i32,
    ) -> Result<Vec<TaxDeadline>, RepositoryError> {
        Ok(self
            .lock()?
            .deadlines
            .values()
            .filter(|d| d.tax_year == tax_year)
            .cloned()
            .collect())
    }
}
