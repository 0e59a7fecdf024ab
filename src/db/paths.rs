// src/db/paths.rs
//! Centralized path derivation for siteward working directories

use std::path::{Path, PathBuf};

/// Directory holding per-instance mirrors of live trees
pub fn cache_dir(work_dir: &Path) -> PathBuf {
    work_dir.join("cache")
}

/// Local mirror of one instance's web root
pub fn instance_cache_dir(work_dir: &Path, instance_id: i64) -> PathBuf {
    cache_dir(work_dir).join(format!("instance-{instance_id}"))
}

/// Local mirrors of an instance's auxiliary data directories
pub fn data_cache_dir(work_dir: &Path, instance_id: i64) -> PathBuf {
    cache_dir(work_dir).join(format!("instance-{instance_id}-data"))
}

/// Scratch area for clean source extractions; never touched by operators
pub fn scratch_dir(work_dir: &Path) -> PathBuf {
    work_dir.join("scratch")
}

/// Staging area for files on their way to or from a host
pub fn staging_dir(work_dir: &Path) -> PathBuf {
    work_dir.join("staging")
}
