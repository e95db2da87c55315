//! Exact decimal storage on top of SQLite's dynamic typing.
//!
//! Amounts are written as TEXT so they reload with the same digits. Reads
//! also accept INTEGER and REAL values for rows written by hand or by older
//! tools.

use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::{Row, TypeInfo, ValueRef};
use tax_core::RepositoryError;

/// Reads a decimal column stored as TEXT, INTEGER or REAL.
pub fn get_decimal(
    row: &sqlx::sqlite::SqliteRow,
    column: &str,
) -> Result<Decimal, RepositoryError> {
    let value_ref = row
        .try_get_raw(column)
        .map_err(|e| RepositoryError::Database(format!("Column '{}' not found: {}", column, e)))?;

    let type_info = value_ref.type_info();
    let type_name = type_info.name();

    match type_name {
        "TEXT" => {
            let text: String = row.try_get(column).map_err(|e| {
                RepositoryError::Database(format!("Failed to get TEXT from '{}': {}", column, e))
            })?;
            Decimal::from_str(text.trim()).map_err(|e| {
                RepositoryError::Database(format!(
                    "Invalid decimal '{}' in column '{}': {}",
                    text, column, e
                ))
            })
        }
        "INTEGER" => {
            let val: i64 = row.try_get(column).map_err(|e| {
                RepositoryError::Database(format!(
                    "Failed to get INTEGER from '{}': {}",
                    column, e
                ))
            })?;
            Ok(Decimal::from(val))
        }
        "REAL" => {
            let val: f64 = row.try_get(column).map_err(|e| {
                RepositoryError::Database(format!("Failed to get REAL from '{}': {}", column, e))
            })?;
            Decimal::try_from(val).map_err(|e| {
                RepositoryError::Database(format!("Failed to convert {} to Decimal: {}", val, e))
            })
        }
        _ => Err(RepositoryError::Database(format!(
            "Unexpected type '{}' for column '{}'",
            type_name, column
        ))),
    }
}

/// Like [`get_decimal`], but NULL reads as `None`.
pub fn get_optional_decimal(
    row: &sqlx::sqlite::SqliteRow,
    column: &str,
) -> Result<Option<Decimal>, RepositoryError> {
    let value_ref = row
        .try_get_raw(column)
        .map_err(|e| RepositoryError::Database(format!("Column '{}' not found: {}", column, e)))?;

    if value_ref.is_null() {
        return Ok(None);
    }

    get_decimal(row, column).map(Some)
}

/// Storage form of a decimal: its exact string representation.
pub fn decimal_to_text(d: Decimal) -> String {
    d.to_string()
}

/// Serialises a name → amount breakdown as a JSON object of decimal strings.
pub fn breakdown_to_json(breakdown: &BTreeMap<String, Decimal>) -> Result<String, RepositoryError> {
    serde_json::to_string(breakdown)
        .map_err(|e| RepositoryError::Database(format!("Failed to encode breakdown: {}", e)))
}

/// Reads a breakdown column written by [`breakdown_to_json`]. NULL or an
/// empty string is an empty breakdown.
pub fn get_breakdown(
    row: &sqlx::sqlite::SqliteRow,
    column: &str,
) -> Result<BTreeMap<String, Decimal>, RepositoryError> {
    let json: Option<String> = row.try_get(column).map_err(|e| {
        RepositoryError::Database(format!("Failed to get TEXT from '{}': {}", column, e))
    })?;

    match json.as_deref().map(str::trim) {
        None | Some("") => Ok(BTreeMap::new()),
        Some(json) => serde_json::from_str(json).map_err(|e| {
            RepositoryError::Database(format!("Invalid breakdown in column '{}': {}", column, e))
        }),
    }
}
