use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Where an owner's running platform income sits relative to the
/// reporting marks. Derived from the monotonic flags, so it answers
/// "did this ever happen" for the tax year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ThresholdLevel {
    Below,
    Approaching,
    Reached,
}

/// Running total of 1099-K reportable income for one (owner, tax year).
///
/// Flags and their timestamps are monotonic: once set they are never
/// cleared for the tax year, even after downward corrections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomeThreshold {
    pub owner_id: i64,
    pub tax_year: i32,
    pub total_reportable_income: Decimal,
    pub income_by_platform: BTreeMap<String, Decimal>,

    pub warned_at_4000: bool,
    pub warned_at_4000_at: Option<DateTime<Utc>>,
    pub threshold_5000_reached: bool,
    pub threshold_5000_reached_at: Option<DateTime<Utc>>,
    pub warned_at_5000: bool,
    pub warned_at_5000_at: Option<DateTime<Utc>>,

    /// Optimistic concurrency token; 0 means never persisted.
    pub version: i64,
}

impl IncomeThreshold {
    /// An empty running total that has never been stored.
    pub fn new(
        owner_id: i64,
        tax_year: i32,
    ) -> Self {
        Self {
            owner_id,
            tax_year,
            total_reportable_income: Decimal::ZERO,
            income_by_platform: BTreeMap::new(),
            warned_at_4000: false,
            warned_at_4000_at: None,
            threshold_5000_reached: false,
            threshold_5000_reached_at: None,
            warned_at_5000: false,
            warned_at_5000_at: None,
            version: 0,
        }
    }

    pub fn level(&self) -> ThresholdLevel {
        if self.threshold_5000_reached {
            ThresholdLevel::Reached
        } else if self.warned_at_4000 {
            ThresholdLevel::Approaching
        } else {
            ThresholdLevel::Below
        }
    }
}
