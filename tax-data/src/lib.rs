//! Operator tooling for the tax engine: bracket CSV import and the shared
//! setup used by the `tax-data-loader` and `tax-engine` binaries.

mod loader;
pub mod setup;

pub use loader::{
    TaxBracketLoader, TaxBracketLoaderError, TaxBracketRecord, schedule_filing_statuses,
};
