//! SQLite storage for the tax estimation engine.
//!
//! [`SqliteRepository`] implements [`tax_core::TaxRepository`] on a sqlx pool;
//! register [`SqliteRepositoryFactory`] with a
//! [`tax_core::RepositoryRegistry`] to expose it as the `"sqlite"` backend.

mod decimal;
mod factory;
mod repository;

pub use factory::SqliteRepositoryFactory;
pub use repository::SqliteRepository;
