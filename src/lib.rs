// src/lib.rs

//! siteward: fleet manager for web application deployments
//!
//! Keeps track of many installations of one web application across local,
//! ssh and ftp hosts, and updates them without silently discarding the
//! changes operators made by hand.
//!
//! # Architecture
//!
//! - Database-first: instances, versions and checksum baselines in SQLite
//! - Uniform transport: one [`access::Access`] trait over local, ssh and ftp
//! - Baselines: every version records `path -> hash` of its clean source
//! - Reconciliation: differences after an update are accepted only where the
//!   live file was untouched before it; everything else is reported

pub mod access;
pub mod application;
pub mod archive;
pub mod checksum;
pub mod config;
pub mod db;
mod error;
pub mod hash;
pub mod maintenance;
pub mod manifest;
pub mod reconcile;
pub mod source;

pub use access::{Access, AccessRegistry, AuthMethod, Capabilities, CommandOutput, Handshake};
pub use checksum::{ChecksumDiff, ChecksumMap, ChecksumStore, HashOptions};
pub use config::ManagerConfig;
pub use error::{Error, MirrorError, MirrorFailure, Result};
pub use hash::HashAlgorithm;
pub use reconcile::{ConflictSet, Reconciliation, UpdateOutcome, UpdateRequest, Updater, reconcile};
