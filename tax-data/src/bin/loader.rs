use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tax_data::TaxBracketLoader;
use tax_data::setup::init_tracing;
use tax_db_sqlite::SqliteRepository;
use tracing::info;

/// Load tax bracket data from a CSV file into the database.
///
/// The CSV file should have the following columns:
/// - tax_year: The tax year (e.g., 2025)
/// - schedule: The IRS schedule code (X, Y-1, Y-2, Z)
/// - min_income: The lower bound of this bracket
/// - max_income: The upper bound (empty for unlimited)
/// - base_tax: Tax on all income below min_income (empty to derive it)
/// - rate: The marginal tax rate as a decimal (e.g., 0.10)
#[derive(Parser, Debug)]
#[command(name = "tax-data-loader")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the CSV file containing tax bracket data
    #[arg(short, long)]
    file: PathBuf,

    /// SQLite database URL or path
    #[arg(short, long, default_value = "sqlite:tax_engine.db?mode=rwc")]
    database: String,

    /// Run database migrations before loading data
    #[arg(short, long, default_value_t = false)]
    migrate: bool,

    /// Run seed files from the specified directory after migrations
    #[arg(short, long)]
    seeds: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let repo = SqliteRepository::new(&args.database).await?;

    if args.migrate {
        repo.run_migrations().await?;
        info!("migrations complete");
    }

    if let Some(seeds_dir) = &args.seeds {
        repo.run_seeds(seeds_dir).await?;
        info!(seeds = %seeds_dir.display(), "seeds complete");
    }

    let file = File::open(&args.file)
        .with_context(|| format!("Failed to open: {}", args.file.display()))?;

    let records = TaxBracketLoader::parse(file)
        .with_context(|| format!("Failed to parse CSV: {}", args.file.display()))?;
    info!(records = records.len(), file = %args.file.display(), "parsed bracket CSV");

    let inserted = TaxBracketLoader::load(&repo, &records)
        .await
        .context("Failed to load tax brackets into database")?;

    println!(
        "Successfully loaded {} tax brackets into the database.",
        inserted
    );

    Ok(())
}
