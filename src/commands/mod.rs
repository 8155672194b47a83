pub mod migrate;
pub mod reconcile;
pub mod serve;
pub mod sync;

use std::path::Path;

use anyhow::{Context, Result};

use edutrack::config::Config;
use edutrack::services::Services;
use edutrack::storage::Store;

// Re-export command functions for convenience
pub use migrate::migrate;
pub use reconcile::reconcile;
pub use serve::serve;
pub use sync::sync;

/// Load configuration from a file if given, otherwise from the environment
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Open the configured SQLite database, creating it if needed
pub fn open_store(config: &Config) -> Result<Store> {
    let path = &config.database.sqlite_path;
    Store::sqlite(path).with_context(|| format!("Failed to open database {}", path.display()))
}

pub fn open_services(config: &Config) -> Result<Services> {
    Ok(Services::new(open_store(config)?))
}
