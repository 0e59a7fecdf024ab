// src/db/mod.rs

//! SQLite persistence for instances, versions and checksum baselines
//!
//! The connection is always passed explicitly; nothing in the crate holds a
//! process-wide handle.

pub mod models;
pub mod paths;
pub mod schema;

use crate::error::{Error, Result};
use rusqlite::{Connection, Transaction};
use std::fs;
use std::path::Path;
use tracing::info;

/// Create the database file (and its directory) and apply all migrations
pub fn init(db_path: &str) -> Result<()> {
    if let Some(parent) = Path::new(db_path).parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| {
            Error::IoError(format!("cannot create {}: {}", parent.display(), e))
        })?;
    }

    let conn = open_connection(db_path)?;
    schema::migrate(&conn)?;
    info!("Database initialized at {}", db_path);
    Ok(())
}

/// Open an existing database, bringing its schema up to date
pub fn open(db_path: &str) -> Result<Connection> {
    if !Path::new(db_path).exists() {
        return Err(Error::NotFound(format!(
            "database {} (run `siteward init` first)",
            db_path
        )));
    }

    let conn = open_connection(db_path)?;
    schema::migrate(&conn)?;
    Ok(conn)
}

/// Open an in-memory database with the full schema, used by tests and dry runs
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    schema::migrate(&conn)?;
    Ok(conn)
}

fn open_connection(db_path: &str) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(conn)
}

/// Run `f` inside a transaction, committing only if it succeeds
pub fn transaction<T, F>(conn: &mut Connection, f: F) -> Result<T>
where
    F: FnOnce(&Transaction) -> Result<T>,
{
    let tx = conn.transaction()?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}
