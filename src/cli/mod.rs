// src/cli/mod.rs
//! CLI definitions for siteward
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.
//!
//! - `init` - Create the database
//! - `instance` - Register, list, inspect and remove instances
//! - `access check` - Prove an instance's host is reachable
//! - `adopt` - Record the first version and baseline of a deployed instance
//! - `verify` - Compare a live tree against its baseline
//! - `update` - Move an instance to a new version and reconcile
//! - `lock` / `unlock` - Maintenance mode
//! - `manifest` - Write a backup manifest

use clap::{Parser, Subcommand};
use siteward::db::models::VcsKind;
use std::path::PathBuf;

mod access;
mod instance;

pub use access::AccessCommands;
pub use instance::InstanceCommands;

#[derive(Parser)]
#[command(name = "siteward")]
#[command(version)]
#[command(about = "Fleet manager for web application deployments", long_about = None)]
pub struct Cli {
    /// Configuration file (default: $SITEWARD_CONFIG, then <config dir>/siteward/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the siteward database
    Init,

    /// Instance management
    #[command(subcommand)]
    Instance(InstanceCommands),

    /// Transport checks
    #[command(subcommand)]
    Access(AccessCommands),

    /// Record the first version of an instance that is already deployed
    Adopt {
        /// Instance name or id
        instance: String,

        /// Branch or tag the instance is running
        branch: String,

        /// Where clean sources live (directory or tarballs)
        #[arg(short, long)]
        source: PathBuf,

        /// Source kind: src or tarball
        #[arg(long, default_value = "src")]
        vcs: VcsKind,

        /// Revision the instance is running, if known
        #[arg(long)]
        revision: Option<String>,
    },

    /// Compare the live tree of an instance against its baseline
    Verify {
        /// Instance name or id
        instance: String,

        /// Also list unchanged files
        #[arg(long)]
        all: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Update an instance to a new branch or tag and reconcile local changes
    Update {
        /// Instance name or id
        instance: String,

        /// Branch or tag to move to
        branch: String,

        /// Where clean sources live (directory or tarballs)
        #[arg(short, long)]
        source: PathBuf,

        /// Source kind: src or tarball
        #[arg(long, default_value = "src")]
        vcs: VcsKind,

        /// Record the change as an upgrade rather than an update
        #[arg(long)]
        upgrade: bool,

        /// Revision being installed, if known
        #[arg(long)]
        revision: Option<String>,

        /// Keep the site in maintenance mode while files change
        #[arg(long)]
        lock: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Put an instance into maintenance mode
    Lock {
        /// Instance name or id
        instance: String,
    },

    /// Take an instance out of maintenance mode
    Unlock {
        /// Instance name or id
        instance: String,
    },

    /// Write a backup manifest for an instance
    Manifest {
        /// Instance name or id
        instance: String,

        /// Hash the live tree instead of using the stored baseline
        #[arg(long)]
        live: bool,

        /// Auxiliary directory on the host to include as data (repeatable)
        #[arg(long = "data", value_name = "DIR")]
        data_dirs: Vec<String>,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
