use anyhow::Result;

use edutrack::config::Config;

use super::open_store;

/// Create the database schema if it does not exist yet
pub async fn migrate(config: Config) -> Result<()> {
    open_store(&config)?;
    println!("Database ready at {}", config.database.sqlite_path.display());
    Ok(())
}
