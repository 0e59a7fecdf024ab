// src/commands/mod.rs
//! Command handlers for the siteward CLI

mod access;
mod init;
mod instance;
mod maintenance;
mod manifest;
mod update;

// Re-export all command handlers
pub use access::cmd_access_check;
pub use init::cmd_init;
pub use instance::{
    cmd_instance_add, cmd_instance_list, cmd_instance_remove, cmd_instance_show,
    cmd_instance_versions, InstanceSpec,
};
pub use maintenance::{cmd_lock, cmd_unlock};
pub use manifest::cmd_manifest;
pub use update::{cmd_adopt, cmd_update, cmd_verify};

use anyhow::{Context, Result};
use rusqlite::Connection;
use siteward::access::Access;
use siteward::checksum::ChecksumMap;
use siteward::db::models::Instance;
use siteward::{AccessRegistry, ManagerConfig};

/// Open the configured database
fn open_db(config: &ManagerConfig) -> Result<Connection> {
    let db_path = config.db_path_str()?;
    siteward::db::open(db_path).context("Failed to open siteward database")
}

/// Open the database and look up one instance by name or id
fn open_instance(config: &ManagerConfig, reference: &str) -> Result<(Connection, Instance)> {
    let conn = open_db(config)?;
    let instance = Instance::resolve(&conn, reference)
        .with_context(|| format!("Unknown instance '{}'", reference))?;
    Ok((conn, instance))
}

/// Transport backend for an instance, built from the configured programs
fn open_access(config: &ManagerConfig, instance: &Instance) -> Result<Box<dyn Access>> {
    AccessRegistry::new()
        .open(instance, &config.access_context())
        .with_context(|| {
            format!("Failed to set up {} access for {}", instance.access_kind, instance.name)
        })
}

/// Print one section of a diff, prefixing each path with `marker`
fn print_paths(title: &str, marker: char, paths: &ChecksumMap) {
    if paths.is_empty() {
        return;
    }
    println!("{} ({}):", title, paths.len());
    for path in paths.keys() {
        println!("  {} {}", marker, path);
    }
}
