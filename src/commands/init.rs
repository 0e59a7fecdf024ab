// src/commands/init.rs
//! Database initialization

use anyhow::{Context, Result};
use siteward::ManagerConfig;
use tracing::info;

/// Create the database and the working directories
pub fn cmd_init(config: &ManagerConfig) -> Result<()> {
    let db_path = config.db_path_str()?;
    info!("Initializing siteward database at: {}", db_path);

    siteward::db::init(db_path).context("Failed to initialize database")?;

    for dir in [
        siteward::db::paths::cache_dir(&config.work_dir),
        siteward::db::paths::scratch_dir(&config.work_dir),
        siteward::db::paths::staging_dir(&config.work_dir),
    ] {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    println!("Database initialized successfully at: {}", db_path);
    println!("Working directory: {}", config.work_dir.display());
    Ok(())
}
