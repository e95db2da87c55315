//! Self-employment tax on net profit.
//!
//! | Step | Description |
//! |------|-------------|
//! | 1    | Net profit; zero or less means no SE tax |
//! | 2    | SE-taxable income: net profit × 92.35% |
//! | 3    | SE tax: SE-taxable income × 15.3% (12.4% Social Security + 2.9% Medicare) |
//! | 4    | Deductible half: SE tax ÷ 2 |
//!
//! No rounding is applied; results carry full decimal precision.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use tax_core::calculations::calculate_self_employment_tax;
//!
//! let result = calculate_self_employment_tax(dec!(10000));
//!
//! assert_eq!(result.se_taxable_income, dec!(9235));
//! assert_eq!(result.self_employment_tax, dec!(1412.955));
//! assert_eq!(result.se_tax_deduction, dec!(706.4775));
//! ```

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::TaxYearConfig;

/// Share of net profit subject to SE tax (the "employer-equivalent" adjustment).
pub const SE_INCOME_MULTIPLIER: Decimal = dec!(0.9235);

/// Social Security portion of the SE tax rate.
pub const SOCIAL_SECURITY_TAX_RATE: Decimal = dec!(0.124);

/// Medicare portion of the SE tax rate.
pub const MEDICARE_TAX_RATE: Decimal = dec!(0.029);

/// Combined SE tax rate.
pub const SE_TAX_RATE: Decimal = dec!(0.153);

/// Result of an SE tax calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfEmploymentTax {
    /// Net profit × SE income multiplier.
    pub se_taxable_income: Decimal,

    /// SE-taxable income × SE tax rate.
    pub self_employment_tax: Decimal,

    /// Half of the SE tax, deductible from income before income tax.
    pub se_tax_deduction: Decimal,
}

impl SelfEmploymentTax {
    pub const ZERO: Self = Self {
        se_taxable_income: Decimal::ZERO,
        self_employment_tax: Decimal::ZERO,
        se_tax_deduction: Decimal::ZERO,
    };
}

/// SE tax calculator parameterised by a tax year's multiplier and rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeTaxCalculator {
    income_multiplier: Decimal,
    tax_rate: Decimal,
}

impl Default for SeTaxCalculator {
    fn default() -> Self {
        Self {
            income_multiplier: SE_INCOME_MULTIPLIER,
            tax_rate: SE_TAX_RATE,
        }
    }
}

impl SeTaxCalculator {
    pub fn new(
        income_multiplier: Decimal,
        tax_rate: Decimal,
    ) -> Self {
        Self {
            income_multiplier,
            tax_rate,
        }
    }

    pub fn from_tax_year_config(config: &TaxYearConfig) -> Self {
        Self::new(config.se_income_multiplier, config.se_tax_rate)
    }

    /// Calculates SE tax for `net_profit`.
    ///
    /// Losses and break-even produce exactly zero for every output. The
    /// function is total over all inputs.
    pub fn calculate(
        &self,
        net_profit: Decimal,
    ) -> SelfEmploymentTax {
        if net_profit <= Decimal::ZERO {
            debug!(net_profit = %net_profit, "net profit is zero or negative; no SE tax due");
            return SelfEmploymentTax::ZERO;
        }

        let se_taxable_income = net_profit * self.income_multiplier;
        let self_employment_tax = se_taxable_income * self.tax_rate;
        let se_tax_deduction = self_employment_tax / Decimal::TWO;

        SelfEmploymentTax {
            se_taxable_income,
            self_employment_tax,
            se_tax_deduction,
        }
    }
}

/// Calculates SE tax with the statutory [`SE_INCOME_MULTIPLIER`] and [`SE_TAX_RATE`].
pub fn calculate_self_employment_tax(net_profit: Decimal) -> SelfEmploymentTax {
    SeTaxCalculator::default().calculate(net_profit)
}
