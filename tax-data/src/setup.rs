//! Process setup shared by the binaries.

use anyhow::{Context, Result};
use tax_core::{DbConfig, RepositoryRegistry, TaxRepository};
use tax_db_sqlite::SqliteRepositoryFactory;
use tracing_subscriber::EnvFilter;

/// Installs a `RUST_LOG`-driven subscriber, defaulting to `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .with_target(false)
        .init();
}

/// Every backend this build can open.
pub fn registry() -> RepositoryRegistry {
    let mut registry = RepositoryRegistry::new();
    registry.register(Box::new(SqliteRepositoryFactory));
    registry
}

/// Environment configuration with command-line overrides applied on top.
pub fn db_config(
    backend: Option<&str>,
    connection_string: Option<&str>,
) -> DbConfig {
    let mut config = DbConfig::from_env();
    if let Some(backend) = backend {
        config.backend = backend.trim().to_ascii_lowercase();
    }
    if let Some(connection_string) = connection_string {
        config.connection_string = connection_string.to_string();
    }
    config
}

/// Opens the configured backend, migrated and seeded.
pub async fn open_repository(config: &DbConfig) -> Result<Box<dyn TaxRepository>> {
    registry().create(config).await.with_context(|| {
        format!(
            "Failed to open {} backend at '{}'",
            config.backend, config.connection_string
        )
    })
}
