// src/cli/instance.rs
//! Instance management commands

use clap::Subcommand;
use siteward::db::models::{AccessKind, ApplicationKind};

#[derive(Subcommand)]
pub enum InstanceCommands {
    /// Register an instance
    Add {
        /// Display name, unique
        name: String,

        /// Web root on the host
        #[arg(long)]
        web_root: String,

        /// How the host is reached: local, ssh or ftp
        #[arg(long, default_value = "local")]
        access: AccessKind,

        /// Application kind: static or unmanaged
        #[arg(long, default_value = "static")]
        app: ApplicationKind,

        /// Public URL of the site (needed to run scripts over ftp)
        #[arg(long)]
        web_url: Option<String>,

        /// Working directory on the host
        #[arg(long)]
        temp_dir: Option<String>,

        /// Script interpreter on the host
        #[arg(long)]
        interpreter: Option<String>,

        /// Remote host
        #[arg(long)]
        host: Option<String>,

        /// Remote port (default: 22 for ssh, 21 for ftp)
        #[arg(long)]
        port: Option<u16>,

        /// Remote user
        #[arg(long)]
        user: Option<String>,

        /// Environment variable holding the password
        #[arg(long, value_name = "VAR")]
        password_env: Option<String>,
    },

    /// List instances
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one instance
    Show {
        /// Instance name or id
        instance: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove an instance with its versions and baselines
    Remove {
        /// Instance name or id
        instance: String,
    },

    /// List the versions recorded for an instance
    Versions {
        /// Instance name or id
        instance: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
