use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Quarter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    DirectPay,
    Eftps,
    Check,
    DebitCard,
    CreditCard,
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectPay => "direct_pay",
            Self::Eftps => "eftps",
            Self::Check => "check",
            Self::DebitCard => "debit_card",
            Self::CreditCard => "credit_card",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "direct_pay" => Some(Self::DirectPay),
            "eftps" => Some(Self::Eftps),
            "check" => Some(Self::Check),
            "debit_card" => Some(Self::DebitCard),
            "credit_card" => Some(Self::CreditCard),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One payment made to the tax authority. Never updated once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimatedPayment {
    pub id: i64,
    pub owner_id: i64,
    pub tax_year: i32,
    pub quarter: Quarter,
    pub payment_date: NaiveDate,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub confirmation_number: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// For recording new payments (no id or timestamp)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEstimatedPayment {
    pub owner_id: i64,
    pub tax_year: i32,
    pub quarter: Quarter,
    pub payment_date: NaiveDate,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub confirmation_number: Option<String>,
    pub notes: Option<String>,
}
