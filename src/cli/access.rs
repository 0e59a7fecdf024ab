// src/cli/access.rs
//! Transport commands

use clap::Subcommand;

#[derive(Subcommand)]
pub enum AccessCommands {
    /// Connect to an instance's host and report how it authenticated
    Check {
        /// Instance name or id
        instance: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
