//! Additive ledger of estimated payments.
//!
//! The ledger knows nothing about liability; callers combine
//! [`PaymentLedger::total_paid`] with a [`TaxEstimate`] through
//! [`remaining_owed`].

use rust_decimal::Decimal;
use tracing::{info, instrument};

use crate::db::TaxRepository;
use crate::error::TaxEngineError;
use crate::models::{EstimatedPayment, NewEstimatedPayment, Quarter, TaxEstimate};

/// `max(0, liability − total_paid)` for `estimate`.
pub fn remaining_owed(
    estimate: &TaxEstimate,
    total_paid: Decimal,
) -> Decimal {
    (estimate.total_tax_liability - total_paid).max(Decimal::ZERO)
}

/// Sum of `payments`, restricted to `quarter` when given.
pub fn sum_payments(
    payments: &[EstimatedPayment],
    quarter: Option<Quarter>,
) -> Decimal {
    payments
        .iter()
        .filter(|p| quarter.is_none_or(|q| p.quarter == q))
        .map(|p| p.amount)
        .sum()
}

pub struct PaymentLedger<'a> {
    repository: &'a dyn TaxRepository,
}

impl<'a> PaymentLedger<'a> {
    pub fn new(repository: &'a dyn TaxRepository) -> Self {
        Self { repository }
    }

    /// Stores a new payment.
    ///
    /// # Errors
    /// [`TaxEngineError::InvalidAmount`] when the amount is not positive.
    #[instrument(skip_all, fields(owner_id = payment.owner_id, tax_year = payment.tax_year, quarter = %payment.quarter))]
    pub async fn record_payment(
        &self,
        payment: NewEstimatedPayment,
    ) -> Result<EstimatedPayment, TaxEngineError> {
        if payment.amount <= Decimal::ZERO {
            return Err(TaxEngineError::invalid_amount("amount", payment.amount));
        }

        let stored = self.repository.create_payment(payment).await?;
        info!(
            payment_id = stored.id,
            amount = %stored.amount,
            method = %stored.method,
            "estimated payment recorded"
        );
        Ok(stored)
    }

    /// Payments for the owner and year, ordered by payment date.
    pub async fn payments(
        &self,
        owner_id: i64,
        tax_year: i32,
    ) -> Result<Vec<EstimatedPayment>, TaxEngineError> {
        Ok(self.repository.list_payments(owner_id, tax_year).await?)
    }

    pub async fn total_paid(
        &self,
        owner_id: i64,
        tax_year: i32,
        quarter: Option<Quarter>,
    ) -> Result<Decimal, TaxEngineError> {
        let payments = self.payments(owner_id, tax_year).await?;
        Ok(sum_payments(&payments, quarter))
    }
}
