// src/db/schema.rs

//! Database schema definitions and migrations
//!
//! This module defines the SQLite schema for all tables and provides a
//! migration system to evolve the schema over time.

use crate::error::{Error, Result};
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the schema version tracking table
fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// Set the schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Apply all pending migrations to bring the database up to date
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    debug!("Current schema version: {}", current_version);

    if current_version >= SCHEMA_VERSION {
        return Ok(());
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying migration to version {}", version);
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    info!("Schema migration complete. Now at version {}", SCHEMA_VERSION);
    Ok(())
}

/// Apply a specific migration version
fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        2 => migrate_v2(conn),
        _ => Err(Error::ParseError(format!(
            "Unknown migration version: {}",
            version
        ))),
    }
}

/// Initial schema - Version 1
///
/// - instances: managed deployments
/// - credentials: one access credential set per instance
/// - versions: software state history per instance
/// - checksums: per-version baselines
fn migrate_v1(conn: &Connection) -> Result<()> {
    debug!("Creating schema version 1");

    conn.execute_batch(
        "
        CREATE TABLE instances (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            web_root TEXT NOT NULL,
            web_url TEXT,
            temp_dir TEXT,
            interpreter TEXT,
            app_kind TEXT NOT NULL CHECK(app_kind IN ('static', 'unmanaged')),
            access_kind TEXT NOT NULL CHECK(access_kind IN ('local', 'ssh', 'ftp')),
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE credentials (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            instance_id INTEGER NOT NULL UNIQUE,
            host TEXT,
            port INTEGER,
            user TEXT,
            secret TEXT,
            FOREIGN KEY (instance_id) REFERENCES instances(id) ON DELETE CASCADE
        );

        CREATE TABLE versions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            instance_id INTEGER NOT NULL,
            vcs TEXT NOT NULL CHECK(vcs IN ('git', 'svn', 'tarball', 'src')),
            branch TEXT NOT NULL,
            revision TEXT,
            date TEXT,
            action TEXT NOT NULL CHECK(action IN ('create', 'update', 'upgrade', 'restore', 'clone')),
            FOREIGN KEY (instance_id) REFERENCES instances(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_versions_instance_id ON versions(instance_id);

        CREATE TABLE checksums (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            version_id INTEGER NOT NULL,
            path TEXT NOT NULL,
            hash TEXT NOT NULL,
            UNIQUE(version_id, path),
            FOREIGN KEY (version_id) REFERENCES versions(id) ON DELETE CASCADE
        );
        ",
    )?;

    Ok(())
}

/// Version 2: record which digest produced a baseline
///
/// Baselines hashed with different algorithms are not comparable.
fn migrate_v2(conn: &Connection) -> Result<()> {
    debug!("Creating schema version 2");

    conn.execute_batch(
        "
        ALTER TABLE versions ADD COLUMN hash_algorithm TEXT NOT NULL DEFAULT 'xxh128';
        ",
    )?;

    Ok(())
}
