use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use tax_core::{
    CalculationStatus, EstimatedPayment, FilingStatus, FilingStatusCode, IncomeThreshold,
    NewEstimatedPayment, PaymentMethod, Quarter, RepositoryError, TaxBracket, TaxDeadline,
    TaxEstimate, TaxRepository, TaxYearConfig,
};
use tracing::debug;

use crate::decimal::{
    breakdown_to_json, decimal_to_text, get_breakdown, get_decimal, get_optional_decimal,
};

const ESTIMATE_COLUMNS: &str = "owner_id, tax_year, quarter, filing_status, period_start, period_end,
    gross_income, income_by_platform, total_deductions, deductions_by_category,
    net_profit, se_taxable_income, self_employment_tax, se_tax_deduction,
    taxable_income, income_tax, effective_tax_rate, prior_withholding,
    total_tax_liability, quarterly_payment, status, calculated_at";

const THRESHOLD_COLUMNS: &str = "owner_id, tax_year, total_reportable_income, income_by_platform,
    warned_at_4000, warned_at_4000_at, threshold_5000_reached, threshold_5000_reached_at,
    warned_at_5000, warned_at_5000_at, version";

const PAYMENT_COLUMNS: &str = "id, owner_id, tax_year, quarter, payment_date, amount, method,
    confirmation_number, notes, created_at";

const DEADLINE_COLUMNS: &str =
    "tax_year, quarter, period_start, period_end, due_date, original_due_date, holiday_adjusted";

pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Opens `database_url`, which may be a sqlx URL (`sqlite:taxes.db`), a
    /// bare file path, or `:memory:`. Files are created when missing.
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {}", database_url))?
            .create_if_missing(true);

        let mut pool_options = SqlitePoolOptions::new().max_connections(5);
        if database_url.contains(":memory:") {
            // The database lives as long as its single connection.
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to database: {}", database_url))?;
        Ok(Self { pool })
    }

    pub async fn new_with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    /// Load and execute all SQL seed files from the specified directory.
    /// Files are executed in alphabetical order by filename.
    pub async fn run_seeds(
        &self,
        seeds_dir: &Path,
    ) -> Result<()> {
        let mut entries: Vec<_> = std::fs::read_dir(seeds_dir)
            .with_context(|| format!("Failed to read seeds directory '{}'", seeds_dir.display()))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "sql"))
            .collect();

        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let path = entry.path();
            let sql = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read seed file '{}'", path.display()))?;

            sqlx::raw_sql(&sql)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to execute seed file '{}'", path.display()))?;
            debug!(seed = %path.display(), "seed file applied");
        }

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn get_payment(
        &self,
        id: i64,
    ) -> Result<EstimatedPayment, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM estimated_payment WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?
        .ok_or(RepositoryError::NotFound)?;

        row_to_payment(&row)
    }
}

// ─── row mapping ───

fn column<'r, T>(
    row: &'r SqliteRow,
    name: &str,
) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| RepositoryError::Database(format!("Failed to get {}: {}", name, e)))
}

/// Quarter column: 0 is the annual/YTD slot.
fn quarter_to_db(quarter: Option<Quarter>) -> i64 {
    quarter.map_or(0, |q| i64::from(q.number()))
}

fn quarter_from_db(value: i64) -> Result<Option<Quarter>, RepositoryError> {
    if value == 0 {
        return Ok(None);
    }
    Quarter::try_from(value)
        .map(Some)
        .map_err(|e| RepositoryError::Database(e.to_string()))
}

fn required_quarter(value: i64) -> Result<Quarter, RepositoryError> {
    quarter_from_db(value)?
        .ok_or_else(|| RepositoryError::Database("quarter 0 is not valid here".to_string()))
}

fn parse_status_code(code: &str) -> Result<FilingStatusCode, RepositoryError> {
    FilingStatusCode::parse(code)
        .ok_or_else(|| RepositoryError::Database(format!("Invalid status code: {}", code)))
}

fn row_to_filing_status(row: &SqliteRow) -> Result<FilingStatus, RepositoryError> {
    let code: String = column(row, "status_code")?;
    Ok(FilingStatus {
        id: column(row, "id")?,
        status_code: parse_status_code(&code)?,
        status_name: column(row, "status_name")?,
    })
}

fn row_to_tax_year_config(row: &SqliteRow) -> Result<TaxYearConfig, RepositoryError> {
    Ok(TaxYearConfig {
        tax_year: column(row, "tax_year")?,
        se_income_multiplier: get_decimal(row, "se_income_multiplier")?,
        se_tax_rate: get_decimal(row, "se_tax_rate")?,
        quarterly_payment_threshold: get_decimal(row, "quarterly_payment_threshold")?,
        platform_income_warning_threshold: get_decimal(row, "platform_income_warning_threshold")?,
        platform_income_reporting_threshold: get_decimal(
            row,
            "platform_income_reporting_threshold",
        )?,
    })
}

fn row_to_tax_bracket(row: &SqliteRow) -> Result<TaxBracket, RepositoryError> {
    Ok(TaxBracket {
        tax_year: column(row, "tax_year")?,
        filing_status_id: column(row, "filing_status_id")?,
        min_income: get_decimal(row, "min_income")?,
        max_income: get_optional_decimal(row, "max_income")?,
        tax_rate: get_decimal(row, "tax_rate")?,
        base_tax: get_decimal(row, "base_tax")?,
    })
}

fn row_to_tax_estimate(row: &SqliteRow) -> Result<TaxEstimate, RepositoryError> {
    let filing_status: String = column(row, "filing_status")?;
    let status: String = column(row, "status")?;

    Ok(TaxEstimate {
        owner_id: column(row, "owner_id")?,
        tax_year: column(row, "tax_year")?,
        quarter: quarter_from_db(column(row, "quarter")?)?,
        filing_status: parse_status_code(&filing_status)?,
        period_start: column::<NaiveDate>(row, "period_start")?,
        period_end: column::<NaiveDate>(row, "period_end")?,
        gross_income: get_decimal(row, "gross_income")?,
        income_by_platform: get_breakdown(row, "income_by_platform")?,
        total_deductions: get_decimal(row, "total_deductions")?,
        deductions_by_category: get_breakdown(row, "deductions_by_category")?,
        net_profit: get_decimal(row, "net_profit")?,
        se_taxable_income: get_decimal(row, "se_taxable_income")?,
        self_employment_tax: get_decimal(row, "self_employment_tax")?,
        se_tax_deduction: get_decimal(row, "se_tax_deduction")?,
        taxable_income: get_decimal(row, "taxable_income")?,
        income_tax: get_decimal(row, "income_tax")?,
        effective_tax_rate: get_optional_decimal(row, "effective_tax_rate")?,
        prior_withholding: get_decimal(row, "prior_withholding")?,
        total_tax_liability: get_decimal(row, "total_tax_liability")?,
        quarterly_payment: get_decimal(row, "quarterly_payment")?,
        status: CalculationStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Database(format!("Invalid status: {}", status)))?,
        calculated_at: column::<DateTime<Utc>>(row, "calculated_at")?,
    })
}

fn row_to_income_threshold(row: &SqliteRow) -> Result<IncomeThreshold, RepositoryError> {
    Ok(IncomeThreshold {
        owner_id: column(row, "owner_id")?,
        tax_year: column(row, "tax_year")?,
        total_reportable_income: get_decimal(row, "total_reportable_income")?,
        income_by_platform: get_breakdown(row, "income_by_platform")?,
        warned_at_4000: column(row, "warned_at_4000")?,
        warned_at_4000_at: column::<Option<DateTime<Utc>>>(row, "warned_at_4000_at")?,
        threshold_5000_reached: column(row, "threshold_5000_reached")?,
        threshold_5000_reached_at: column::<Option<DateTime<Utc>>>(row, "threshold_5000_reached_at")?,
        warned_at_5000: column(row, "warned_at_5000")?,
        warned_at_5000_at: column::<Option<DateTime<Utc>>>(row, "warned_at_5000_at")?,
        version: column(row, "version")?,
    })
}

fn row_to_payment(row: &SqliteRow) -> Result<EstimatedPayment, RepositoryError> {
    let method: String = column(row, "method")?;
    Ok(EstimatedPayment {
        id: column(row, "id")?,
        owner_id: column(row, "owner_id")?,
        tax_year: column(row, "tax_year")?,
        quarter: required_quarter(column(row, "quarter")?)?,
        payment_date: column::<NaiveDate>(row, "payment_date")?,
        amount: get_decimal(row, "amount")?,
        method: PaymentMethod::parse(&method)
            .ok_or_else(|| RepositoryError::Database(format!("Invalid payment method: {}", method)))?,
        confirmation_number: column(row, "confirmation_number")?,
        notes: column(row, "notes")?,
        created_at: column::<DateTime<Utc>>(row, "created_at")?,
    })
}

fn row_to_deadline(row: &SqliteRow) -> Result<TaxDeadline, RepositoryError> {
    Ok(TaxDeadline {
        tax_year: column(row, "tax_year")?,
        quarter: required_quarter(column(row, "quarter")?)?,
        period_start: column::<NaiveDate>(row, "period_start")?,
        period_end: column::<NaiveDate>(row, "period_end")?,
        due_date: column::<NaiveDate>(row, "due_date")?,
        original_due_date: column::<NaiveDate>(row, "original_due_date")?,
        holiday_adjusted: column(row, "holiday_adjusted")?,
    })
}

#[async_trait]
impl TaxRepository for SqliteRepository {
    async fn get_tax_year_config(
        &self,
        year: i32,
    ) -> Result<TaxYearConfig, RepositoryError> {
        let row = sqlx::query(
            "SELECT tax_year, se_income_multiplier, se_tax_rate, quarterly_payment_threshold,
                    platform_income_warning_threshold, platform_income_reporting_threshold
             FROM tax_year_config WHERE tax_year = ?",
        )
        .bind(year)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?
        .ok_or(RepositoryError::NotFound)?;

        row_to_tax_year_config(&row)
    }

    async fn list_tax_years(&self) -> Result<Vec<i32>, RepositoryError> {
        let rows = sqlx::query("SELECT tax_year FROM tax_year_config ORDER BY tax_year DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        rows.iter().map(|row| column(row, "tax_year")).collect()
    }

    async fn get_filing_status(
        &self,
        id: i32,
    ) -> Result<FilingStatus, RepositoryError> {
        let row =
            sqlx::query("SELECT id, status_code, status_name FROM filing_status WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RepositoryError::Database(e.to_string()))?
                .ok_or(RepositoryError::NotFound)?;

        row_to_filing_status(&row)
    }

    async fn get_filing_status_by_code(
        &self,
        code: FilingStatusCode,
    ) -> Result<FilingStatus, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, status_code, status_name FROM filing_status WHERE status_code = ?",
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?
        .ok_or(RepositoryError::NotFound)?;

        row_to_filing_status(&row)
    }

    async fn list_filing_statuses(&self) -> Result<Vec<FilingStatus>, RepositoryError> {
        let rows =
            sqlx::query("SELECT id, status_code, status_name FROM filing_status ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| RepositoryError::Database(e.to_string()))?;

        rows.iter().map(row_to_filing_status).collect()
    }

    async fn get_tax_brackets(
        &self,
        tax_year: i32,
        filing_status_id: i32,
    ) -> Result<Vec<TaxBracket>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT tax_year, filing_status_id, min_income, max_income, tax_rate, base_tax
             FROM tax_brackets
             WHERE tax_year = ? AND filing_status_id = ?
             ORDER BY CAST(min_income AS REAL)",
        )
        .bind(tax_year)
        .bind(filing_status_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        rows.iter().map(row_to_tax_bracket).collect()
    }

    async fn insert_tax_bracket(
        &self,
        bracket: &TaxBracket,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO tax_brackets (tax_year, filing_status_id, min_income, max_income, tax_rate, base_tax)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(bracket.tax_year)
        .bind(bracket.filing_status_id)
        .bind(decimal_to_text(bracket.min_income))
        .bind(bracket.max_income.map(decimal_to_text))
        .bind(decimal_to_text(bracket.tax_rate))
        .bind(decimal_to_text(bracket.base_tax))
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        Ok(())
    }

    async fn delete_tax_brackets(
        &self,
        tax_year: i32,
        filing_status_id: i32,
    ) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM tax_brackets WHERE tax_year = ? AND filing_status_id = ?")
            .bind(tax_year)
            .bind(filing_status_id)
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        Ok(())
    }

    async fn replace_tax_brackets(
        &self,
        tax_year: i32,
        filing_status_id: i32,
        brackets: &[TaxBracket],
    ) -> Result<usize, RepositoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        sqlx::query("DELETE FROM tax_brackets WHERE tax_year = ? AND filing_status_id = ?")
            .bind(tax_year)
            .bind(filing_status_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        for bracket in brackets {
            sqlx::query(
                "INSERT INTO tax_brackets (tax_year, filing_status_id, min_income, max_income, tax_rate, base_tax)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(tax_year)
            .bind(filing_status_id)
            .bind(decimal_to_text(bracket.min_income))
            .bind(bracket.max_income.map(decimal_to_text))
            .bind(decimal_to_text(bracket.tax_rate))
            .bind(decimal_to_text(bracket.base_tax))
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        debug!(tax_year, filing_status_id, rows = brackets.len(), "bracket table replaced");
        Ok(brackets.len())
    }

    async fn save_estimate(
        &self,
        estimate: &TaxEstimate,
    ) -> Result<(), RepositoryError> {
        sqlx::query(&format!(
            "INSERT OR REPLACE INTO tax_estimate ({ESTIMATE_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(estimate.owner_id)
        .bind(estimate.tax_year)
        .bind(quarter_to_db(estimate.quarter))
        .bind(estimate.filing_status.as_str())
        .bind(estimate.period_start)
        .bind(estimate.period_end)
        .bind(decimal_to_text(estimate.gross_income))
        .bind(breakdown_to_json(&estimate.income_by_platform)?)
        .bind(decimal_to_text(estimate.total_deductions))
        .bind(breakdown_to_json(&estimate.deductions_by_category)?)
        .bind(decimal_to_text(estimate.net_profit))
        .bind(decimal_to_text(estimate.se_taxable_income))
        .bind(decimal_to_text(estimate.self_employment_tax))
        .bind(decimal_to_text(estimate.se_tax_deduction))
        .bind(decimal_to_text(estimate.taxable_income))
        .bind(decimal_to_text(estimate.income_tax))
        .bind(estimate.effective_tax_rate.map(decimal_to_text))
        .bind(decimal_to_text(estimate.prior_withholding))
        .bind(decimal_to_text(estimate.total_tax_liability))
        .bind(decimal_to_text(estimate.quarterly_payment))
        .bind(estimate.status.as_str())
        .bind(estimate.calculated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        Ok(())
    }

    async fn get_estimate(
        &self,
        owner_id: i64,
        tax_year: i32,
        quarter: Option<Quarter>,
    ) -> Result<TaxEstimate, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {ESTIMATE_COLUMNS} FROM tax_estimate
             WHERE owner_id = ? AND tax_year = ? AND quarter = ?"
        ))
        .bind(owner_id)
        .bind(tax_year)
        .bind(quarter_to_db(quarter))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?
        .ok_or(RepositoryError::NotFound)?;

        row_to_tax_estimate(&row)
    }

    async fn list_estimates(
        &self,
        owner_id: i64,
        tax_year: Option<i32>,
    ) -> Result<Vec<TaxEstimate>, RepositoryError> {
        let rows = match tax_year {
            Some(year) => {
                sqlx::query(&format!(
                    "SELECT {ESTIMATE_COLUMNS} FROM tax_estimate
                     WHERE owner_id = ? AND tax_year = ?
                     ORDER BY tax_year DESC, quarter"
                ))
                .bind(owner_id)
                .bind(year)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {ESTIMATE_COLUMNS} FROM tax_estimate
                     WHERE owner_id = ?
                     ORDER BY tax_year DESC, quarter"
                ))
                .bind(owner_id)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        rows.iter().map(row_to_tax_estimate).collect()
    }

    async fn mark_estimates_stale(
        &self,
        owner_id: i64,
        tax_year: i32,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE tax_estimate SET status = ?
             WHERE owner_id = ? AND tax_year = ? AND status = ?",
        )
        .bind(CalculationStatus::Stale.as_str())
        .bind(owner_id)
        .bind(tax_year)
        .bind(CalculationStatus::Current.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn delete_estimate(
        &self,
        owner_id: i64,
        tax_year: i32,
        quarter: Option<Quarter>,
    ) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("DELETE FROM tax_estimate WHERE owner_id = ? AND tax_year = ? AND quarter = ?")
                .bind(owner_id)
                .bind(tax_year)
                .bind(quarter_to_db(quarter))
                .execute(&self.pool)
                .await
                .map_err(|e| RepositoryError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn get_income_threshold(
        &self,
        owner_id: i64,
        tax_year: i32,
    ) -> Result<IncomeThreshold, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {THRESHOLD_COLUMNS} FROM income_threshold WHERE owner_id = ? AND tax_year = ?"
        ))
        .bind(owner_id)
        .bind(tax_year)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?
        .ok_or(RepositoryError::NotFound)?;

        row_to_income_threshold(&row)
    }

    async fn save_income_threshold(
        &self,
        threshold: &IncomeThreshold,
    ) -> Result<IncomeThreshold, RepositoryError> {
        let next_version = threshold.version + 1;
        let platforms = breakdown_to_json(&threshold.income_by_platform)?;

        let insert_sql = format!(
            "INSERT INTO income_threshold ({THRESHOLD_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (owner_id, tax_year) DO NOTHING"
        );

        // A first write inserts; later writes must match the version they read.
        let query = if threshold.version == 0 {
            sqlx::query(&insert_sql)
                .bind(threshold.owner_id)
                .bind(threshold.tax_year)
                .bind(decimal_to_text(threshold.total_reportable_income))
                .bind(platforms)
                .bind(threshold.warned_at_4000)
                .bind(threshold.warned_at_4000_at)
                .bind(threshold.threshold_5000_reached)
                .bind(threshold.threshold_5000_reached_at)
                .bind(threshold.warned_at_5000)
                .bind(threshold.warned_at_5000_at)
                .bind(next_version)
        } else {
            sqlx::query(
                "UPDATE income_threshold SET
                    total_reportable_income = ?, income_by_platform = ?,
                    warned_at_4000 = ?, warned_at_4000_at = ?,
                    threshold_5000_reached = ?, threshold_5000_reached_at = ?,
                    warned_at_5000 = ?, warned_at_5000_at = ?,
                    version = ?
                 WHERE owner_id = ? AND tax_year = ? AND version = ?",
            )
            .bind(decimal_to_text(threshold.total_reportable_income))
            .bind(platforms)
            .bind(threshold.warned_at_4000)
            .bind(threshold.warned_at_4000_at)
            .bind(threshold.threshold_5000_reached)
            .bind(threshold.threshold_5000_reached_at)
            .bind(threshold.warned_at_5000)
            .bind(threshold.warned_at_5000_at)
            .bind(next_version)
            .bind(threshold.owner_id)
            .bind(threshold.tax_year)
            .bind(threshold.version)
        };

        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict {
                entity: "income_threshold",
                expected_version: threshold.version,
            });
        }

        Ok(IncomeThreshold {
            version: next_version,
            ..threshold.clone()
        })
    }

    async fn create_payment(
        &self,
        payment: NewEstimatedPayment,
    ) -> Result<EstimatedPayment, RepositoryError> {
        let now = Utc::now();

        let result = sqlx::query(
            "INSERT INTO estimated_payment (
                owner_id, tax_year, quarter, payment_date, amount, method,
                confirmation_number, notes, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(payment.owner_id)
        .bind(payment.tax_year)
        .bind(i64::from(payment.quarter.number()))
        .bind(payment.payment_date)
        .bind(decimal_to_text(payment.amount))
        .bind(payment.method.as_str())
        .bind(payment.confirmation_number)
        .bind(payment.notes)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        self.get_payment(result.last_insert_rowid()).await
    }

    async fn list_payments(
        &self,
        owner_id: i64,
        tax_year: i32,
    ) -> Result<Vec<EstimatedPayment>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM estimated_payment
             WHERE owner_id = ? AND tax_year = ?
             ORDER BY payment_date, id"
        ))
        .bind(owner_id)
        .bind(tax_year)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        rows.iter().map(row_to_payment).collect()
    }

    async fn delete_payment(
        &self,
        id: i64,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM estimated_payment WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn save_deadlines(
        &self,
        deadlines: &[TaxDeadline],
    ) -> Result<(), RepositoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        for deadline in deadlines {
            sqlx::query(&format!(
                "INSERT OR REPLACE INTO tax_deadline ({DEADLINE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(deadline.tax_year)
            .bind(i64::from(deadline.quarter.number()))
            .bind(deadline.period_start)
            .bind(deadline.period_end)
            .bind(deadline.due_date)
            .bind(deadline.original_due_date)
            .bind(deadline.holiday_adjusted)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))
    }

    async fn list_deadlines(
        &self,
        tax_year: i32,
    ) -> Result<Vec<TaxDeadline>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {DEADLINE_COLUMNS} FROM tax_deadline WHERE tax_year = ? ORDER BY quarter"
        ))
        .bind(tax_year)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        rows.iter().map(row_to_deadline).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::*;

    async fn setup_test_db() -> SqliteRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");

        let repo = SqliteRepository::new_with_pool(pool).await;
        repo.run_migrations()
            .await
            .expect("Failed to run migrations");
        repo
    }

    async fn setup_seeded_db() -> SqliteRepository {
        let repo = setup_test_db().await;
        let seeds = Path::new(env!("CARGO_MANIFEST_DIR")).join("seeds");
        repo.run_seeds(&seeds).await.expect("Failed to run seeds");
        repo
    }

    fn ymd(
        y: i32,
        m: u32,
        d: u32,
    ) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_estimate(quarter: Option<Quarter>) -> TaxEstimate {
        TaxEstimate {
            owner_id: 42,
            tax_year: 2025,
            quarter,
            filing_status: FilingStatusCode::Single,
            period_start: ymd(2025, 1, 1),
            period_end: ymd(2025, 12, 31),
            gross_income: dec!(20000),
            income_by_platform: BTreeMap::from([
                ("DoorDash".to_string(), dec!(7500.25)),
                ("Uber".to_string(), dec!(12499.75)),
            ]),
            total_deductions: dec!(5000),
            deductions_by_category: BTreeMap::from([
                ("mileage".to_string(), dec!(3500)),
                ("phone".to_string(), dec!(1500)),
            ]),
            net_profit: dec!(15000),
            se_taxable_income: dec!(13852.5),
            self_employment_tax: dec!(2119.4325),
            se_tax_deduction: dec!(1059.71625),
            taxable_income: dec!(13940.28375),
            income_tax: dec!(1434.33405),
            effective_tax_rate: Some(dec!(0.1776883275)),
            prior_withholding: dec!(250),
            total_tax_liability: dec!(3553.76655),
            quarterly_payment: dec!(888.4416375),
            status: CalculationStatus::Current,
            calculated_at: Utc.with_ymd_and_hms(2025, 6, 30, 9, 15, 0).unwrap(),
        }
    }

    fn new_payment(
        quarter: Quarter,
        day: u32,
        amount: rust_decimal::Decimal,
    ) -> NewEstimatedPayment {
        NewEstimatedPayment {
            owner_id: 42,
            tax_year: 2025,
            quarter,
            payment_date: ymd(2025, 4, day),
            amount,
            method: PaymentMethod::DirectPay,
            confirmation_number: Some("DP-0001".to_string()),
            notes: None,
        }
    }

    // =========================================================================
    // reference data
    // =========================================================================

    #[tokio::test]
    async fn test_seeded_filing_statuses() {
        let repo = setup_seeded_db().await;

        let statuses = repo.list_filing_statuses().await.unwrap();

        let codes: Vec<_> = statuses.iter().map(|s| s.status_code).collect();
        assert_eq!(codes, FilingStatusCode::ALL.to_vec());
        assert_eq!(statuses[0].status_name, "Single");
    }

    #[tokio::test]
    async fn test_get_filing_status_by_code() {
        let repo = setup_seeded_db().await;

        let status = repo
            .get_filing_status_by_code(FilingStatusCode::HeadOfHousehold)
            .await
            .unwrap();

        assert_eq!(repo.get_filing_status(status.id).await, Ok(status));
    }

    #[tokio::test]
    async fn test_get_filing_status_not_found() {
        let repo = setup_test_db().await;

        assert_eq!(repo.get_filing_status(999).await, Err(RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_seeded_tax_year_config_matches_current_law() {
        let repo = setup_seeded_db().await;

        let config = repo.get_tax_year_config(2025).await.unwrap();

        assert_eq!(config, TaxYearConfig::current_law(2025));
        assert_eq!(repo.list_tax_years().await, Ok(vec![2026, 2025]));
    }

    #[tokio::test]
    async fn test_get_tax_year_config_not_found() {
        let repo = setup_test_db().await;

        assert_eq!(repo.get_tax_year_config(1999).await, Err(RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_seeded_brackets_are_ordered_numerically() {
        let repo = setup_seeded_db().await;

        let brackets = repo.get_tax_brackets(2025, 1).await.unwrap();

        let bounds: Vec<_> = brackets.iter().map(|b| b.min_income).collect();
        assert_eq!(
            bounds,
            vec![
                dec!(0),
                dec!(11925),
                dec!(48475),
                dec!(103350),
                dec!(197300),
                dec!(250525),
                dec!(626350)
            ]
        );
        assert_eq!(brackets.last().unwrap().max_income, None);
    }

    #[tokio::test]
    async fn test_running_seeds_twice_is_harmless() {
        let repo = setup_seeded_db().await;
        let seeds = Path::new(env!("CARGO_MANIFEST_DIR")).join("seeds");

        repo.run_seeds(&seeds).await.unwrap();

        assert_eq!(repo.get_tax_brackets(2025, 1).await.unwrap().len(), 7);
        assert_eq!(repo.list_filing_statuses().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_run_seeds_nonexistent_directory() {
        let repo = setup_test_db().await;

        let result = repo.run_seeds(Path::new("/nonexistent/seeds")).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_insert_and_delete_tax_brackets() {
        let repo = setup_seeded_db().await;
        repo.delete_tax_brackets(2030, 1).await.unwrap();

        for (min, max, rate) in [
            (dec!(0), Some(dec!(10000)), dec!(0.10)),
            (dec!(10000), None, dec!(0.20)),
        ] {
            repo.insert_tax_bracket(&TaxBracket {
                tax_year: 2030,
                filing_status_id: 1,
                min_income: min,
                max_income: max,
                tax_rate: rate,
                base_tax: dec!(0),
            })
            .await
            .unwrap();
        }
        assert_eq!(repo.get_tax_brackets(2030, 1).await.unwrap().len(), 2);

        repo.delete_tax_brackets(2030, 1).await.unwrap();
        assert_eq!(repo.get_tax_brackets(2030, 1).await, Ok(vec![]));
    }

    fn bracket(
        min_income: Decimal,
        max_income: Option<Decimal>,
        tax_rate: Decimal,
    ) -> TaxBracket {
        TaxBracket {
            tax_year: 2025,
            filing_status_id: 1,
            min_income,
            max_income,
            tax_rate,
            base_tax: dec!(0),
        }
    }

    #[tokio::test]
    async fn test_replace_tax_brackets_swaps_whole_table() {
        let repo = setup_seeded_db().await;

        let replaced = repo
            .replace_tax_brackets(
                2025,
                1,
                &[
                    bracket(dec!(0), Some(dec!(12000)), dec!(0.10)),
                    bracket(dec!(12000), None, dec!(0.20)),
                ],
            )
            .await
            .unwrap();

        assert_eq!(replaced, 2);
        let rows = repo.get_tax_brackets(2025, 1).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].min_income, dec!(12000));
        // Other statuses are untouched.
        assert_eq!(repo.get_tax_brackets(2025, 2).await.unwrap().len(), 7);
    }

    #[tokio::test]
    async fn test_replace_tax_brackets_rolls_back_on_failed_insert() {
        let repo = setup_seeded_db().await;
        let before = repo.get_tax_brackets(2025, 1).await.unwrap();

        // Duplicate lower bound violates the unique key on the second insert.
        let result = repo
            .replace_tax_brackets(
                2025,
                1,
                &[
                    bracket(dec!(0), Some(dec!(12000)), dec!(0.10)),
                    bracket(dec!(0), None, dec!(0.20)),
                ],
            )
            .await;

        assert!(matches!(result, Err(RepositoryError::Database(_))));
        assert_eq!(repo.get_tax_brackets(2025, 1).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_reseeding_keeps_a_replaced_table() {
        let repo = setup_seeded_db().await;
        repo.replace_tax_brackets(
            2025,
            1,
            &[
                bracket(dec!(0), Some(dec!(12000)), dec!(0.10)),
                bracket(dec!(12000), None, dec!(0.20)),
            ],
        )
        .await
        .unwrap();

        let seeds = Path::new(env!("CARGO_MANIFEST_DIR")).join("seeds");
        repo.run_seeds(&seeds).await.unwrap();

        let rows = repo.get_tax_brackets(2025, 1).await.unwrap();
        let bounds: Vec<_> = rows.iter().map(|b| b.min_income).collect();
        assert_eq!(bounds, vec![dec!(0), dec!(12000)]);
    }

    // =========================================================================
    // estimates
    // =========================================================================

    #[tokio::test]
    async fn test_estimate_round_trips_field_for_field() {
        let repo = setup_test_db().await;
        let estimate = sample_estimate(None);

        repo.save_estimate(&estimate).await.unwrap();

        assert_eq!(repo.get_estimate(42, 2025, None).await, Ok(estimate));
    }

    #[tokio::test]
    async fn test_estimate_without_rate_round_trips() {
        let repo = setup_test_db().await;
        let estimate = TaxEstimate {
            effective_tax_rate: None,
            gross_income: dec!(0),
            income_by_platform: BTreeMap::new(),
            deductions_by_category: BTreeMap::new(),
            ..sample_estimate(Some(Quarter::Q3))
        };

        repo.save_estimate(&estimate).await.unwrap();

        assert_eq!(repo.get_estimate(42, 2025, Some(Quarter::Q3)).await, Ok(estimate));
    }

    #[tokio::test]
    async fn test_save_estimate_replaces_same_slot() {
        let repo = setup_test_db().await;
        repo.save_estimate(&sample_estimate(Some(Quarter::Q2))).await.unwrap();
        let newer = TaxEstimate {
            gross_income: dec!(21000),
            calculated_at: Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap(),
            ..sample_estimate(Some(Quarter::Q2))
        };

        repo.save_estimate(&newer).await.unwrap();

        assert_eq!(repo.list_estimates(42, Some(2025)).await, Ok(vec![newer]));
    }

    #[tokio::test]
    async fn test_list_estimates_orders_annual_first() {
        let repo = setup_test_db().await;
        repo.save_estimate(&sample_estimate(Some(Quarter::Q1))).await.unwrap();
        repo.save_estimate(&sample_estimate(None)).await.unwrap();

        let quarters: Vec<_> = repo
            .list_estimates(42, None)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.quarter)
            .collect();

        assert_eq!(quarters, vec![None, Some(Quarter::Q1)]);
        assert_eq!(repo.list_estimates(7, None).await, Ok(vec![]));
    }

    #[tokio::test]
    async fn test_mark_estimates_stale_skips_overrides() {
        let repo = setup_test_db().await;
        repo.save_estimate(&sample_estimate(None)).await.unwrap();
        repo.save_estimate(&TaxEstimate {
            status: CalculationStatus::ManualOverride,
            ..sample_estimate(Some(Quarter::Q1))
        })
        .await
        .unwrap();

        let changed = repo.mark_estimates_stale(42, 2025).await.unwrap();

        assert_eq!(changed, 1);
        let annual = repo.get_estimate(42, 2025, None).await.unwrap();
        let q1 = repo.get_estimate(42, 2025, Some(Quarter::Q1)).await.unwrap();
        assert_eq!(annual.status, CalculationStatus::Stale);
        assert_eq!(q1.status, CalculationStatus::ManualOverride);
    }

    #[tokio::test]
    async fn test_delete_estimate() {
        let repo = setup_test_db().await;
        repo.save_estimate(&sample_estimate(None)).await.unwrap();

        repo.delete_estimate(42, 2025, None).await.unwrap();

        assert_eq!(repo.get_estimate(42, 2025, None).await, Err(RepositoryError::NotFound));
        assert_eq!(
            repo.delete_estimate(42, 2025, None).await,
            Err(RepositoryError::NotFound)
        );
    }

    // =========================================================================
    // income threshold
    // =========================================================================

    #[tokio::test]
    async fn test_threshold_insert_then_update() {
        let repo = setup_test_db().await;
        let mut threshold = IncomeThreshold::new(42, 2025);
        threshold.total_reportable_income = dec!(5100);
        threshold.income_by_platform = BTreeMap::from([("Uber".to_string(), dec!(5100))]);
        threshold.threshold_5000_reached = true;
        threshold.threshold_5000_reached_at = Some(Utc.with_ymd_and_hms(2025, 5, 2, 8, 0, 0).unwrap());

        let first = repo.save_income_threshold(&threshold).await.unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(repo.get_income_threshold(42, 2025).await, Ok(first.clone()));

        let mut next = first.clone();
        next.total_reportable_income = dec!(5200);
        let second = repo.save_income_threshold(&next).await.unwrap();

        assert_eq!(second.version, 2);
        assert_eq!(repo.get_income_threshold(42, 2025).await, Ok(second));
    }

    #[tokio::test]
    async fn test_threshold_stale_version_conflicts() {
        let repo = setup_test_db().await;
        let stored = repo
            .save_income_threshold(&IncomeThreshold::new(42, 2025))
            .await
            .unwrap();
        repo.save_income_threshold(&stored).await.unwrap();

        assert_eq!(
            repo.save_income_threshold(&stored).await,
            Err(RepositoryError::Conflict {
                entity: "income_threshold",
                expected_version: 1,
            })
        );
    }

    #[tokio::test]
    async fn test_threshold_double_insert_conflicts() {
        let repo = setup_test_db().await;
        repo.save_income_threshold(&IncomeThreshold::new(42, 2025))
            .await
            .unwrap();

        assert_eq!(
            repo.save_income_threshold(&IncomeThreshold::new(42, 2025)).await,
            Err(RepositoryError::Conflict {
                entity: "income_threshold",
                expected_version: 0,
            })
        );
    }

    #[tokio::test]
    async fn test_threshold_not_found() {
        let repo = setup_test_db().await;

        assert_eq!(
            repo.get_income_threshold(42, 2025).await,
            Err(RepositoryError::NotFound)
        );
    }

    // =========================================================================
    // payments
    // =========================================================================

    #[tokio::test]
    async fn test_create_and_list_payments_by_date() {
        let repo = setup_test_db().await;
        let late = repo.create_payment(new_payment(Quarter::Q1, 14, dec!(400))).await.unwrap();
        let early = repo.create_payment(new_payment(Quarter::Q1, 2, dec!(50.5))).await.unwrap();

        assert_eq!(late.amount, dec!(400));
        assert_eq!(late.confirmation_number.as_deref(), Some("DP-0001"));
        assert_eq!(repo.list_payments(42, 2025).await, Ok(vec![early, late]));
        assert_eq!(repo.list_payments(42, 2024).await, Ok(vec![]));
    }

    #[tokio::test]
    async fn test_delete_payment() {
        let repo = setup_test_db().await;
        let payment = repo.create_payment(new_payment(Quarter::Q2, 1, dec!(10))).await.unwrap();

        repo.delete_payment(payment.id).await.unwrap();

        assert_eq!(repo.delete_payment(payment.id).await, Err(RepositoryError::NotFound));
    }

    // =========================================================================
    // deadlines
    // =========================================================================

    #[tokio::test]
    async fn test_save_deadlines_is_idempotent() {
        let repo = setup_test_db().await;
        let deadline = TaxDeadline {
            tax_year: 2025,
            quarter: Quarter::Q2,
            period_start: ymd(2025, 4, 1),
            period_end: ymd(2025, 6, 30),
            due_date: ymd(2025, 6, 16),
            original_due_date: ymd(2025, 6, 15),
            holiday_adjusted: true,
        };

        repo.save_deadlines(std::slice::from_ref(&deadline)).await.unwrap();
        repo.save_deadlines(std::slice::from_ref(&deadline)).await.unwrap();

        assert_eq!(repo.list_deadlines(2025).await, Ok(vec![deadline]));
    }
}
