//! Running 1099-K reportable income per (owner, tax year).
//!
//! Two independent marks are tracked:
//!
//! | Mark     | Flag(s) set on first crossing                  |
//! |----------|-------------------------------------------------|
//! | $4,000   | `warned_at_4000`                                |
//! | $5,000   | `threshold_5000_reached`, `warned_at_5000`      |
//!
//! A mark is crossed when the running total reaches it (inclusive). Flags
//! and their timestamps never change once set, so a later correction that
//! lowers the total leaves them in place.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info, instrument};

use crate::db::{RepositoryError, TaxRepository};
use crate::error::TaxEngineError;
use crate::models::{IncomeThreshold, TaxYearConfig};

/// Cumulative platform income at which owners are warned they are close.
pub const PLATFORM_INCOME_WARNING_THRESHOLD: Decimal = dec!(4000);

/// Cumulative platform income at which platforms issue a 1099-K.
pub const PLATFORM_INCOME_REPORTING_THRESHOLD: Decimal = dec!(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdMarks {
    pub warning: Decimal,
    pub reporting: Decimal,
}

impl Default for ThresholdMarks {
    fn default() -> Self {
        Self {
            warning: PLATFORM_INCOME_WARNING_THRESHOLD,
            reporting: PLATFORM_INCOME_REPORTING_THRESHOLD,
        }
    }
}

impl ThresholdMarks {
    pub fn from_tax_year_config(config: &TaxYearConfig) -> Self {
        Self {
            warning: config.platform_income_warning_threshold,
            reporting: config.platform_income_reporting_threshold,
        }
    }
}

/// Marks crossed for the first time by one update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThresholdCrossing {
    pub warning: bool,
    pub reporting: bool,
}

impl ThresholdCrossing {
    pub fn any(&self) -> bool {
        self.warning || self.reporting
    }
}

/// Adds `amount` from `platform` to the running total and sets any newly
/// crossed flags, stamping them with `recorded_at`.
///
/// # Errors
/// [`TaxEngineError::InvalidAmount`] when `amount` is not positive.
pub fn apply_platform_income(
    threshold: &mut IncomeThreshold,
    platform: &str,
    amount: Decimal,
    recorded_at: DateTime<Utc>,
    marks: ThresholdMarks,
) -> Result<ThresholdCrossing, TaxEngineError> {
    if amount <= Decimal::ZERO {
        return Err(TaxEngineError::invalid_amount("amount", amount));
    }

    *threshold
        .income_by_platform
        .entry(platform.trim().to_string())
        .or_insert(Decimal::ZERO) += amount;
    threshold.total_reportable_income += amount;

    let total = threshold.total_reportable_income;
    let mut crossing = ThresholdCrossing::default();

    if total >= marks.warning && !threshold.warned_at_4000 {
        threshold.warned_at_4000 = true;
        threshold.warned_at_4000_at = Some(recorded_at);
        crossing.warning = true;
    }
    if total >= marks.reporting && !threshold.threshold_5000_reached {
        threshold.threshold_5000_reached = true;
        threshold.threshold_5000_reached_at = Some(recorded_at);
        crossing.reporting = true;
    }
    if total >= marks.reporting && !threshold.warned_at_5000 {
        threshold.warned_at_5000 = true;
        threshold.warned_at_5000_at = Some(recorded_at);
        crossing.reporting = true;
    }

    Ok(crossing)
}

/// Takes back up to `amount` previously recorded for `platform`.
///
/// Neither the platform share nor the total drops below zero, and no flag
/// is cleared. Returns the amount actually removed.
///
/// # Errors
/// [`TaxEngineError::InvalidAmount`] when `amount` is not positive.
pub fn remove_platform_income(
    threshold: &mut IncomeThreshold,
    platform: &str,
    amount: Decimal,
) -> Result<Decimal, TaxEngineError> {
    if amount <= Decimal::ZERO {
        return Err(TaxEngineError::invalid_amount("amount", amount));
    }

    let platform = platform.trim();
    let Some(share) = threshold.income_by_platform.get_mut(platform) else {
        return Ok(Decimal::ZERO);
    };

    let removed = amount.min(*share);
    *share -= removed;
    if share.is_zero() {
        threshold.income_by_platform.remove(platform);
    }
    threshold.total_reportable_income = (threshold.total_reportable_income - removed).max(Decimal::ZERO);

    Ok(removed)
}

/// Read-modify-write access to stored [`IncomeThreshold`]s.
///
/// Each write is an optimistic compare-and-swap on the row version. A lost
/// race comes back as [`RepositoryError::Conflict`] inside
/// [`TaxEngineError::Repository`]; retrying is the caller's decision.
pub struct ThresholdTracker<'a> {
    repository: &'a dyn TaxRepository,
    marks: ThresholdMarks,
}

impl<'a> ThresholdTracker<'a> {
    pub fn new(
        repository: &'a dyn TaxRepository,
        marks: ThresholdMarks,
    ) -> Self {
        Self { repository, marks }
    }

    /// Stored running total, or an empty one when nothing has been recorded.
    pub async fn status(
        &self,
        owner_id: i64,
        tax_year: i32,
    ) -> Result<IncomeThreshold, TaxEngineError> {
        match self.repository.get_income_threshold(owner_id, tax_year).await {
            Ok(threshold) => Ok(threshold),
            Err(RepositoryError::NotFound) => Ok(IncomeThreshold::new(owner_id, tax_year)),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    pub async fn record_platform_income(
        &self,
        owner_id: i64,
        tax_year: i32,
        platform: &str,
        amount: Decimal,
        recorded_at: DateTime<Utc>,
    ) -> Result<IncomeThreshold, TaxEngineError> {
        if amount <= Decimal::ZERO {
            return Err(TaxEngineError::invalid_amount("amount", amount));
        }

        let mut threshold = self.status(owner_id, tax_year).await?;
        let crossing = apply_platform_income(&mut threshold, platform, amount, recorded_at, self.marks)?;
        let saved = self.repository.save_income_threshold(&threshold).await?;

        if crossing.warning {
            info!(
                owner_id,
                tax_year,
                total = %saved.total_reportable_income,
                mark = %self.marks.warning,
                "platform income approaching 1099-K reporting threshold"
            );
        }
        if crossing.reporting {
            info!(
                owner_id,
                tax_year,
                total = %saved.total_reportable_income,
                mark = %self.marks.reporting,
                "platform income reached 1099-K reporting threshold"
            );
        }
        if !crossing.any() {
            debug!(total = %saved.total_reportable_income, "platform income recorded");
        }

        Ok(saved)
    }

    #[instrument(skip(self))]
    pub async fn remove_platform_income(
        &self,
        owner_id: i64,
        tax_year: i32,
        platform: &str,
        amount: Decimal,
    ) -> Result<IncomeThreshold, TaxEngineError> {
        let mut threshold = self.status(owner_id, tax_year).await?;
        let removed = remove_platform_income(&mut threshold, platform, amount)?;
        if removed.is_zero() {
            debug!("nothing recorded for platform; correction ignored");
            return Ok(threshold);
        }

        let saved = self.repository.save_income_threshold(&threshold).await?;
        info!(
            owner_id,
            tax_year,
            removed = %removed,
            total = %saved.total_reportable_income,
            "platform income corrected"
        );
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::memory::InMemoryRepository;
    use crate::models::ThresholdLevel;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, 12, 0, 0).unwrap()
    }

    // =========================================================================
    // pure updates
    // =========================================================================

    #[test]
    fn below_warning_sets_no_flags() {
        let mut threshold = IncomeThreshold::new(1, 2025);

        let crossing =
            apply_platform_income(&mut threshold, "Uber", dec!(3999.99), at(1), ThresholdMarks::default())
                .unwrap();

        assert_eq!(crossing, ThresholdCrossing::default());
        assert_eq!(threshold.level(), ThresholdLevel::Below);
    }

    #[test]
    fn reaching_warning_mark_exactly_sets_warning() {
        let mut threshold = IncomeThreshold::new(1, 2025);

        let crossing =
            apply_platform_income(&mut threshold, "Uber", dec!(4000), at(1), ThresholdMarks::default())
                .unwrap();

        assert!(crossing.warning);
        assert!(!crossing.reporting);
        assert_eq!(threshold.warned_at_4000_at, Some(at(1)));
        assert_eq!(threshold.level(), ThresholdLevel::Approaching);
    }

    #[test]
    fn single_jump_past_both_marks_sets_all_flags() {
        let mut threshold = IncomeThreshold::new(1, 2025);

        let crossing =
            apply_platform_income(&mut threshold, "Etsy", dec!(7500), at(2), ThresholdMarks::default())
                .unwrap();

        assert_eq!(
            crossing,
            ThresholdCrossing {
                warning: true,
                reporting: true
            }
        );
        assert!(threshold.warned_at_4000 && threshold.threshold_5000_reached && threshold.warned_at_5000);
        assert_eq!(threshold.threshold_5000_reached_at, Some(at(2)));
    }

    #[test]
    fn reached_timestamp_never_moves() {
        let marks = ThresholdMarks::default();
        let mut threshold = IncomeThreshold::new(1, 2025);

        apply_platform_income(&mut threshold, "Uber", dec!(5000), at(1), marks).unwrap();
        let crossing = apply_platform_income(&mut threshold, "Uber", dec!(100), at(9), marks).unwrap();

        assert!(!crossing.any());
        assert_eq!(threshold.threshold_5000_reached_at, Some(at(1)));
        assert_eq!(threshold.warned_at_4000_at, Some(at(1)));
    }

    #[test]
    fn platform_shares_sum_to_total() {
        let marks = ThresholdMarks::default();
        let mut threshold = IncomeThreshold::new(1, 2025);

        apply_platform_income(&mut threshold, "Uber", dec!(1200.50), at(1), marks).unwrap();
        apply_platform_income(&mut threshold, " DoorDash ", dec!(800), at(2), marks).unwrap();
        apply_platform_income(&mut threshold, "Uber", dec!(99.50), at(3), marks).unwrap();

        assert_eq!(threshold.total_reportable_income, dec!(2100.00));
        assert_eq!(threshold.income_by_platform["Uber"], dec!(1300.00));
        assert_eq!(threshold.income_by_platform["DoorDash"], dec!(800));
    }

    #[test]
    fn non_positive_income_is_rejected() {
        let mut threshold = IncomeThreshold::new(1, 2025);

        for amount in [dec!(0), dec!(-10)] {
            assert_eq!(
                apply_platform_income(&mut threshold, "Uber", amount, at(1), ThresholdMarks::default()),
                Err(TaxEngineError::invalid_amount("amount", amount))
            );
        }
        assert_eq!(threshold, IncomeThreshold::new(1, 2025));
    }

    // =========================================================================
    // corrections
    // =========================================================================

    #[test]
    fn correction_below_mark_keeps_flags() {
        let mut threshold = IncomeThreshold::new(1, 2025);
        apply_platform_income(&mut threshold, "Uber", dec!(5200), at(1), ThresholdMarks::default()).unwrap();

        let removed = remove_platform_income(&mut threshold, "Uber", dec!(3000)).unwrap();

        assert_eq!(removed, dec!(3000));
        assert_eq!(threshold.total_reportable_income, dec!(2200));
        assert!(threshold.threshold_5000_reached);
        assert_eq!(threshold.threshold_5000_reached_at, Some(at(1)));
        assert_eq!(threshold.level(), ThresholdLevel::Reached);
    }

    #[test]
    fn correction_never_goes_below_zero() {
        let mut threshold = IncomeThreshold::new(1, 2025);
        apply_platform_income(&mut threshold, "Uber", dec!(300), at(1), ThresholdMarks::default()).unwrap();

        let removed = remove_platform_income(&mut threshold, "Uber", dec!(500)).unwrap();

        assert_eq!(removed, dec!(300));
        assert_eq!(threshold.total_reportable_income, dec!(0));
        assert!(!threshold.income_by_platform.contains_key("Uber"));
    }

    #[test]
    fn correction_for_unknown_platform_removes_nothing() {
        let mut threshold = IncomeThreshold::new(1, 2025);
        apply_platform_income(&mut threshold, "Uber", dec!(300), at(1), ThresholdMarks::default()).unwrap();

        let removed = remove_platform_income(&mut threshold, "Lyft", dec!(100)).unwrap();

        assert_eq!(removed, dec!(0));
        assert_eq!(threshold.total_reportable_income, dec!(300));
    }

    // =========================================================================
    // tracker over a repository
    // =========================================================================

    #[tokio::test]
    async fn status_of_unknown_owner_is_empty() {
        let repo = InMemoryRepository::default();
        let tracker = ThresholdTracker::new(&repo, ThresholdMarks::default());

        assert_eq!(tracker.status(7, 2025).await, Ok(IncomeThreshold::new(7, 2025)));
    }

    #[tokio::test]
    async fn reached_flips_exactly_once_across_updates() {
        let repo = InMemoryRepository::default();
        let tracker = ThresholdTracker::new(&repo, ThresholdMarks::default());

        let mut transitions = 0;
        let mut reached = false;
        for (day, amount) in [(1, dec!(2000)), (2, dec!(2500)), (3, dec!(600)), (4, dec!(900))] {
            let threshold = tracker
                .record_platform_income(7, 2025, "Uber", amount, at(day))
                .await
                .unwrap();
            if threshold.threshold_5000_reached != reached {
                transitions += 1;
                reached = threshold.threshold_5000_reached;
            }
        }
        tracker.remove_platform_income(7, 2025, "Uber", dec!(5000)).await.unwrap();

        let status = tracker.status(7, 2025).await.unwrap();
        assert_eq!(transitions, 1);
        assert!(status.threshold_5000_reached);
        assert_eq!(status.threshold_5000_reached_at, Some(at(3)));
        assert_eq!(status.total_reportable_income, dec!(1000));
    }

    #[tokio::test]
    async fn stale_version_surfaces_conflict() {
        let repo = InMemoryRepository::default();
        let tracker = ThresholdTracker::new(&repo, ThresholdMarks::default());
        let first = tracker
            .record_platform_income(7, 2025, "Uber", dec!(100), at(1))
            .await
            .unwrap();

        // Another writer advances the stored version.
        tracker
            .record_platform_income(7, 2025, "Uber", dec!(100), at(2))
            .await
            .unwrap();

        let result = repo.save_income_threshold(&first).await;
        assert_eq!(
            result,
            Err(RepositoryError::Conflict {
                entity: "income_threshold",
                expected_version: first.version,
            })
        );
    }

    #[tokio::test]
    async fn years_are_tracked_independently() {
        let repo = InMemoryRepository::default();
        let tracker = ThresholdTracker::new(&repo, ThresholdMarks::default());

        tracker.record_platform_income(7, 2024, "Uber", dec!(6000), at(1)).await.unwrap();
        let current = tracker.status(7, 2025).await.unwrap();

        assert_eq!(current.level(), ThresholdLevel::Below);
    }
}
