//! Tax estimation and threshold tracking for independent contractors.
//!
//! | Module          | Contents |
//! |-----------------|----------|
//! | [`calculations`] | Pure SE tax, income tax, estimate and requirement calculators |
//! | [`schedule`]     | Quarterly due dates and the holiday calendar |
//! | [`tracking`]     | Platform income threshold tracker and payment ledger |
//! | [`engine`]       | [`TaxEngine`], the owner-facing facade over a repository |
//! | [`db`]           | The [`TaxRepository`] storage trait and backend registry |
//! | [`models`]       | Domain records shared by everything above |

pub mod calculations;
pub mod db;
pub mod engine;
pub mod error;
pub mod models;
pub mod schedule;
pub mod tracking;

pub use db::{DbConfig, RepositoryError, RepositoryFactory, RepositoryRegistry, TaxRepository};
pub use engine::{QuarterlySummary, TaxEngine};
pub use error::TaxEngineError;
pub use models::*;
