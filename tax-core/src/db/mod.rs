pub mod factory;
#[cfg(test)]
pub(crate) mod memory;
pub mod repository;

pub use factory::{BACKEND_ENV, CONNECTION_ENV, DbConfig, RepositoryFactory, RepositoryRegistry};
pub use repository::{RepositoryError, TaxRepository};
