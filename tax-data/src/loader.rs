use std::collections::BTreeMap;
use std::io::Read;

use rust_decimal::Decimal;
use serde::Deserialize;
use tax_core::{
    BracketTable, BracketTableError, FilingStatusCode, RepositoryError, TaxBracket, TaxRepository,
};
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur when loading tax bracket data.
#[derive(Debug, Error, PartialEq)]
pub enum TaxBracketLoaderError {
    #[error("CSV parse error: {0}")]
    CsvParse(String),

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Schedule {schedule} for {tax_year} is not a valid bracket table: {source}")]
    InvalidTable {
        tax_year: i32,
        schedule: String,
        #[source]
        source: BracketTableError,
    },

    #[error("Filing status '{0}' not found in database (have you run the seeds?)")]
    FilingStatusNotFound(String),

    #[error("Tax year {0} not found in database (have you run the seeds?)")]
    TaxYearNotFound(i32),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<csv::Error> for TaxBracketLoaderError {
    fn from(err: csv::Error) -> Self {
        TaxBracketLoaderError::CsvParse(err.to_string())
    }
}

/// Maps IRS schedule codes to filing statuses.
///
/// - Schedule X → Single
/// - Schedule Y-1 → Married Filing Jointly and Qualifying Surviving Spouse
/// - Schedule Y-2 → Married Filing Separately
/// - Schedule Z → Head of Household
pub fn schedule_filing_statuses(
    schedule: &str
) -> Result<&'static [FilingStatusCode], TaxBracketLoaderError> {
    match schedule.trim().to_ascii_uppercase().as_str() {
        "X" => Ok(&[FilingStatusCode::Single]),
        "Y-1" => Ok(&[
            FilingStatusCode::MarriedFilingJointly,
            FilingStatusCode::QualifyingSurvivingSpouse,
        ]),
        "Y-2" => Ok(&[FilingStatusCode::MarriedFilingSeparately]),
        "Z" => Ok(&[FilingStatusCode::HeadOfHousehold]),
        _ => Err(TaxBracketLoaderError::InvalidSchedule(schedule.to_string())),
    }
}

/// A single record from the tax brackets CSV file.
///
/// Columns:
/// - `tax_year`: the tax year (e.g., 2025)
/// - `schedule`: the IRS schedule code (X, Y-1, Y-2, Z)
/// - `min_income`: the lower bound of this bracket
/// - `max_income`: the upper bound (empty for the open-ended top bracket)
/// - `base_tax`: tax owed on all income below `min_income`; when empty it is
///   derived from the lower brackets of the same schedule
/// - `rate`: the marginal rate as a fraction (e.g., 0.10 for 10%)
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TaxBracketRecord {
    pub tax_year: i32,
    pub schedule: String,
    pub min_income: Decimal,
    #[serde(deserialize_with = "deserialize_optional_decimal")]
    pub max_income: Option<Decimal>,
    #[serde(deserialize_with = "deserialize_optional_decimal")]
    pub base_tax: Option<Decimal>,
    pub rate: Decimal,
}

fn deserialize_optional_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s {
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => s
            .trim()
            .parse::<Decimal>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// Orders one schedule's records by lower bound and fills in any missing
/// `base_tax` from the full slices beneath it.
fn with_base_tax(records: &[&TaxBracketRecord]) -> Vec<TaxBracketRecord> {
    let mut sorted: Vec<TaxBracketRecord> = records.iter().map(|r| (*r).clone()).collect();
    sorted.sort_by(|a, b| a.min_income.cmp(&b.min_income));

    let mut below = Decimal::ZERO;
    for record in &mut sorted {
        let base_tax = *record.base_tax.get_or_insert(below);
        if let Some(max_income) = record.max_income {
            below = base_tax + (max_income - record.min_income) * record.rate;
        }
    }
    sorted
}

/// Loader for tax bracket data from CSV files.
///
/// Reads CSV data and writes it through the [`TaxRepository`] trait, so it
/// works with any registered backend. Every schedule is checked as a
/// [`BracketTable`] before anything is written.
pub struct TaxBracketLoader;

impl TaxBracketLoader {
    /// Parse tax bracket records from a CSV reader.
    pub fn parse<R: Read>(reader: R) -> Result<Vec<TaxBracketRecord>, TaxBracketLoaderError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut records = Vec::new();

        for result in csv_reader.deserialize() {
            let record: TaxBracketRecord = result?;
            records.push(record);
        }

        Ok(records)
    }

    /// Load tax bracket records into the database.
    ///
    /// Records are grouped by (tax year, schedule). Every group is mapped to
    /// its filing statuses and validated before the first write. Then, for
    /// each filing status, the existing rows for that year are replaced.
    /// Loading the same file twice leaves the same rows behind.
    ///
    /// Schedule Y-1 is written for both MFJ and QSS. Returns the number of
    /// rows inserted.
    pub async fn load<R: TaxRepository + ?Sized>(
        repo: &R,
        records: &[TaxBracketRecord],
    ) -> Result<usize, TaxBracketLoaderError> {
        let mut groups: BTreeMap<(i32, String), Vec<&TaxBracketRecord>> = BTreeMap::new();
        for record in records {
            groups
                .entry((record.tax_year, record.schedule.trim().to_ascii_uppercase()))
                .or_default()
                .push(record);
        }

        let mut prepared = Vec::with_capacity(groups.len());
        for ((tax_year, schedule), group) in &groups {
            let statuses = schedule_filing_statuses(schedule)?;
            let rows = with_base_tax(group);

            let as_brackets: Vec<TaxBracket> = rows
                .iter()
                .map(|r| to_bracket(r, 0))
                .collect();
            BracketTable::from_brackets(*tax_year, statuses[0], &as_brackets).map_err(
                |source| TaxBracketLoaderError::InvalidTable {
                    tax_year: *tax_year,
                    schedule: schedule.clone(),
                    source,
                },
            )?;

            prepared.push((*tax_year, schedule.as_str(), statuses, rows));
        }

        let mut inserted = 0;
        for (tax_year, schedule, statuses, rows) in prepared {
            repo.get_tax_year_config(tax_year)
                .await
                .map_err(|e| match e {
                    RepositoryError::NotFound => TaxBracketLoaderError::TaxYearNotFound(tax_year),
                    other => TaxBracketLoaderError::Repository(other),
                })?;

            for &status in statuses {
                let filing_status = repo
                    .get_filing_status_by_code(status)
                    .await
                    .map_err(|e| match e {
                        RepositoryError::NotFound => {
                            TaxBracketLoaderError::FilingStatusNotFound(status.as_str().to_string())
                        }
                        other => TaxBracketLoaderError::Repository(other),
                    })?;

                let table: Vec<TaxBracket> = rows
                    .iter()
                    .map(|r| to_bracket(r, filing_status.id))
                    .collect();
                inserted += repo
                    .replace_tax_brackets(tax_year, filing_status.id, &table)
                    .await?;
                debug!(tax_year, schedule, status = %status, rows = rows.len(), "brackets replaced");
            }
        }

        info!(inserted, "tax brackets loaded");
        Ok(inserted)
    }
}

fn to_bracket(
    record: &TaxBracketRecord,
    filing_status_id: i32,
) -> TaxBracket {
    TaxBracket {
        tax_year: record.tax_year,
        filing_status_id,
        min_income: record.min_income,
        max_income: record.max_income,
        tax_rate: record.rate,
        base_tax: record.base_tax.unwrap_or(Decimal::ZERO),
    }
}
