use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use tax_core::calculations::EstimateInput;
use tax_core::calculations::common::{breakdown_sum, round_half_up};
use tax_core::{
    FilingStatusCode, NewEstimatedPayment, PaymentMethod, Quarter, TaxEngine, TaxPeriod,
};
use tax_data::setup::{db_config, init_tracing, open_repository};

/// Quarterly tax estimates, platform income thresholds and payment tracking
/// for independent contractors.
#[derive(Parser, Debug)]
#[command(name = "tax-engine")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Storage backend (overrides TAX_ENGINE_DB_BACKEND)
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Connection string (overrides TAX_ENGINE_DATABASE_URL)
    #[arg(long, global = true)]
    db: Option<String>,

    /// Print results as JSON instead of text
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Calculate and store an estimate, with the quarterly requirement and next deadline
    Estimate(EstimateArgs),

    /// Check whether a projected annual liability calls for quarterly payments
    Assess {
        #[arg(long)]
        year: i32,

        #[arg(long)]
        liability: Decimal,
    },

    /// List the four quarterly due dates for a tax year
    Deadlines {
        #[arg(long)]
        year: i32,

        /// Show amounts paid and days remaining for this owner
        #[arg(long)]
        owner: Option<i64>,

        /// Reference date (defaults to today, UTC)
        #[arg(long)]
        today: Option<NaiveDate>,
    },

    /// Add (or with --remove, correct) 1099-K reportable platform income
    RecordIncome {
        #[arg(long)]
        owner: i64,

        #[arg(long)]
        year: i32,

        #[arg(long)]
        platform: String,

        #[arg(long)]
        amount: Decimal,

        #[arg(long, default_value_t = false)]
        remove: bool,
    },

    /// Show the running platform income total and threshold flags
    Threshold {
        #[arg(long)]
        owner: i64,

        #[arg(long)]
        year: i32,
    },

    /// Record an estimated tax payment
    RecordPayment {
        #[arg(long)]
        owner: i64,

        #[arg(long)]
        year: i32,

        #[arg(long, value_parser = parse_quarter)]
        quarter: Quarter,

        #[arg(long)]
        amount: Decimal,

        #[arg(long)]
        date: NaiveDate,

        /// direct_pay, eftps, check, debit_card, credit_card or other
        #[arg(long, value_parser = parse_method, default_value = "direct_pay")]
        method: PaymentMethod,

        #[arg(long)]
        confirmation: Option<String>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// List recorded payments for a tax year
    Payments {
        #[arg(long)]
        owner: i64,

        #[arg(long)]
        year: i32,
    },
}

#[derive(Args, Debug)]
struct EstimateArgs {
    #[arg(long)]
    owner: i64,

    #[arg(long)]
    year: i32,

    /// Calendar quarter 1-4; omit for the full year
    #[arg(long, value_parser = parse_quarter, conflicts_with = "as_of")]
    quarter: Option<Quarter>,

    /// Year to date through this day
    #[arg(long)]
    as_of: Option<NaiveDate>,

    /// S, MFJ, MFS, HOH or QSS
    #[arg(long, value_parser = parse_filing_status, default_value = "S")]
    status: FilingStatusCode,

    /// Gross income; defaults to the sum of --platform amounts
    #[arg(long)]
    gross: Option<Decimal>,

    /// Income per platform as NAME=AMOUNT (repeatable)
    #[arg(long = "platform", value_parser = parse_pair)]
    platforms: Vec<(String, Decimal)>,

    /// Total deductions; defaults to the sum of --deduction amounts
    #[arg(long)]
    deductions: Option<Decimal>,

    /// Deductions per category as NAME=AMOUNT (repeatable)
    #[arg(long = "deduction", value_parser = parse_pair)]
    deduction_categories: Vec<(String, Decimal)>,

    #[arg(long, default_value_t = Decimal::ZERO)]
    withholding: Decimal,

    /// Reference date for the deadline lookup (defaults to today, UTC)
    #[arg(long)]
    today: Option<NaiveDate>,
}

fn parse_quarter(s: &str) -> Result<Quarter, String> {
    let n: u8 = s
        .trim()
        .trim_start_matches(['Q', 'q'])
        .parse()
        .map_err(|_| format!("'{s}' is not a quarter"))?;
    Quarter::try_from(n).map_err(|e| e.to_string())
}

fn parse_filing_status(s: &str) -> Result<FilingStatusCode, String> {
    FilingStatusCode::parse(s).ok_or_else(|| format!("unknown filing status '{s}'"))
}

fn parse_method(s: &str) -> Result<PaymentMethod, String> {
    PaymentMethod::parse(s).ok_or_else(|| format!("unknown payment method '{s}'"))
}

fn parse_pair(s: &str) -> Result<(String, Decimal), String> {
    let (name, amount) = s
        .rsplit_once('=')
        .ok_or_else(|| format!("expected NAME=AMOUNT, got '{s}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing name in '{s}'"));
    }
    let amount = amount
        .trim()
        .parse::<Decimal>()
        .map_err(|e| format!("invalid amount in '{s}': {e}"))?;
    Ok((name.to_string(), amount))
}

fn breakdown(pairs: &[(String, Decimal)]) -> BTreeMap<String, Decimal> {
    let mut map = BTreeMap::new();
    for (name, amount) in pairs {
        *map.entry(name.clone()).or_insert(Decimal::ZERO) += *amount;
    }
    map
}

impl EstimateArgs {
    fn period(&self) -> Result<TaxPeriod> {
        let period = match (self.quarter, self.as_of) {
            (Some(quarter), _) => TaxPeriod::quarter(self.year, quarter)?,
            (None, Some(as_of)) => TaxPeriod::year_to_date(self.year, as_of)?,
            (None, None) => TaxPeriod::annual(self.year)?,
        };
        Ok(period)
    }

    fn input(&self) -> Result<EstimateInput> {
        let income_by_platform = breakdown(&self.platforms);
        let deductions_by_category = breakdown(&self.deduction_categories);
        Ok(EstimateInput {
            owner_id: self.owner,
            period: self.period()?,
            filing_status: self.status,
            gross_income: self
                .gross
                .unwrap_or_else(|| breakdown_sum(&income_by_platform)),
            income_by_platform,
            total_deductions: self
                .deductions
                .unwrap_or_else(|| breakdown_sum(&deductions_by_category)),
            deductions_by_category,
            prior_withholding: self.withholding,
        })
    }
}

fn money(value: Decimal) -> String {
    format!("${:.2}", round_half_up(value))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to encode JSON output")?
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = db_config(cli.backend.as_deref(), cli.db.as_deref());
    let repository = open_repository(&config).await?;
    let engine = TaxEngine::new(repository.as_ref());
    let today = Utc::now().date_naive();

    match cli.command {
        Command::Estimate(args) => {
            let input = args.input()?;
            let summary = engine
                .quarterly_summary(&input, args.today.unwrap_or(today), Utc::now())
                .await?;
            if cli.json {
                return print_json(&summary);
            }

            let e = &summary.estimate;
            println!(
                "Estimate for owner {} ({} to {}, {})",
                e.owner_id,
                e.period_start,
                e.period_end,
                e.filing_status.name()
            );
            println!("  Gross income:          {}", money(e.gross_income));
            println!("  Deductions:            {}", money(e.total_deductions));
            println!("  Net profit:            {}", money(e.net_profit));
            println!("  Self-employment tax:   {}", money(e.self_employment_tax));
            println!("  SE tax deduction:      {}", money(e.se_tax_deduction));
            println!("  Taxable income:        {}", money(e.taxable_income));
            println!("  Income tax:            {}", money(e.income_tax));
            println!("  Total tax liability:   {}", money(e.total_tax_liability));
            if let Some(rate) = e.effective_tax_rate {
                println!("  Effective rate:        {:.2}%", round_half_up(rate * Decimal::ONE_HUNDRED));
            }
            println!("  Quarterly payment:     {}", money(e.quarterly_payment));
            println!("  Paid so far:           {}", money(summary.total_paid));
            println!("  Remaining owed:        {}", money(summary.remaining_owed));
            println!();
            println!("{}", summary.assessment.assessment_message);
            if let Some(next) = &summary.next_deadline {
                println!(
                    "Next deadline: {} {} due {} ({} days)",
                    next.deadline.tax_year,
                    next.deadline.quarter,
                    next.deadline.due_date,
                    next.days_until_due
                );
            }
            println!();
            println!("{}", summary.assessment.disclaimer);
        }

        Command::Assess { year, liability } => {
            let assessment = engine.assess_quarterly_requirement(year, liability).await?;
            if cli.json {
                return print_json(&assessment);
            }
            println!("{}", assessment.assessment_message);
            println!();
            println!("{}", assessment.disclaimer);
        }

        Command::Deadlines {
            year,
            owner,
            today: reference,
        } => {
            let reference = reference.unwrap_or(today);
            match owner {
                Some(owner) => {
                    let statuses = engine.deadline_statuses(owner, year, reference).await?;
                    if cli.json {
                        return print_json(&statuses);
                    }
                    for status in statuses {
                        let d = &status.deadline;
                        println!(
                            "{} {}  due {}  paid {:>12}  {:>5} days{}",
                            d.tax_year,
                            d.quarter,
                            d.due_date,
                            money(status.amount_paid),
                            status.days_until_due,
                            if status.is_overdue { "  OVERDUE" } else { "" }
                        );
                    }
                }
                None => {
                    let deadlines = engine.deadlines(year).await?;
                    if cli.json {
                        return print_json(&deadlines);
                    }
                    for d in deadlines {
                        println!(
                            "{} {}  {} to {}  due {}{}",
                            d.tax_year,
                            d.quarter,
                            d.period_start,
                            d.period_end,
                            d.due_date,
                            if d.holiday_adjusted {
                                format!(" (moved from {})", d.original_due_date)
                            } else {
                                String::new()
                            }
                        );
                    }
                }
            }
        }

        Command::RecordIncome {
            owner,
            year,
            platform,
            amount,
            remove,
        } => {
            let threshold = if remove {
                engine
                    .remove_platform_income(owner, year, &platform, amount)
                    .await?
            } else {
                engine
                    .record_platform_income(owner, year, &platform, amount, Utc::now())
                    .await?
            };
            if cli.json {
                return print_json(&threshold);
            }
            println!(
                "Reportable platform income for {}: {} ({:?})",
                year,
                money(threshold.total_reportable_income),
                threshold.level()
            );
        }

        Command::Threshold { owner, year } => {
            let threshold = engine.threshold_status(owner, year).await?;
            if cli.json {
                return print_json(&threshold);
            }
            println!(
                "Reportable platform income for {}: {} ({:?})",
                year,
                money(threshold.total_reportable_income),
                threshold.level()
            );
            for (platform, amount) in &threshold.income_by_platform {
                println!("  {:<20} {}", platform, money(*amount));
            }
            if let Some(at) = threshold.warned_at_4000_at {
                println!("  Approaching 1099-K reporting since {}", at);
            }
            if let Some(at) = threshold.threshold_5000_reached_at {
                println!("  1099-K reporting threshold reached {}", at);
            }
        }

        Command::RecordPayment {
            owner,
            year,
            quarter,
            amount,
            date,
            method,
            confirmation,
            notes,
        } => {
            let payment = engine
                .record_payment(NewEstimatedPayment {
                    owner_id: owner,
                    tax_year: year,
                    quarter,
                    payment_date: date,
                    amount,
                    method,
                    confirmation_number: confirmation,
                    notes,
                })
                .await?;
            if cli.json {
                return print_json(&payment);
            }
            println!(
                "Recorded payment #{}: {} for {} {} via {}",
                payment.id,
                money(payment.amount),
                payment.tax_year,
                payment.quarter,
                payment.method
            );
        }

        Command::Payments { owner, year } => {
            let payments = engine.payments(owner, year).await?;
            if cli.json {
                return print_json(&payments);
            }
            if payments.is_empty() {
                println!("No payments recorded for owner {} in {}.", owner, year);
                return Ok(());
            }
            for p in &payments {
                println!(
                    "#{:<4} {}  {}  {:>12}  {}",
                    p.id,
                    p.payment_date,
                    p.quarter,
                    money(p.amount),
                    p.method
                );
            }
            let total: Decimal = payments.iter().map(|p| p.amount).sum();
            println!("Total paid: {}", money(total));
        }
    }

    Ok(())
}
