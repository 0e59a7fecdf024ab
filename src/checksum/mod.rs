// src/checksum/mod.rs

//! Checksum maps: baselines, live snapshots and their differences
//!
//! A checksum map is `relative path -> content hash` for every regular
//! file under a tree. Paths use `/` separators and never start with `/`.
//! Maps are ordered so reports come out the same on every run.

mod diff;
mod store;

pub use diff::{ChecksumDiff, diff};
pub use store::ChecksumStore;

use crate::error::{Error, Result};
use crate::hash::{self, HashAlgorithm};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Relative path -> content hash
pub type ChecksumMap = BTreeMap<String, String>;

/// What to hash and how
#[derive(Debug, Clone)]
pub struct HashOptions {
    pub algorithm: HashAlgorithm,
    /// Names skipped at any depth, or relative paths skipped with everything below
    pub exclude: Vec<String>,
}

impl Default for HashOptions {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::default(),
            exclude: vec![".git".to_string(), ".svn".to_string()],
        }
    }
}

impl HashOptions {
    fn is_excluded(&self, relative: &str) -> bool {
        self.exclude.iter().any(|pattern| {
            let pattern = pattern.trim_matches('/');
            if pattern.contains('/') {
                relative == pattern || relative.starts_with(&format!("{pattern}/"))
            } else {
                relative.split('/').any(|component| component == pattern)
            }
        })
    }
}

/// Relative `/`-separated form of `path` under `root`
pub fn relative_path(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| Error::InvalidPath(format!("{} is outside {}", path.display(), root.display())))?;

    let parts = relative
        .components()
        .map(|c| {
            c.as_os_str()
                .to_str()
                .ok_or_else(|| Error::InvalidPath(format!("{} is not valid UTF-8", path.display())))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(parts.join("/"))
}

/// Hash every regular file under `root`
///
/// Symlinks are not followed and not hashed.
pub fn hash_tree(root: &Path, options: &HashOptions) -> Result<ChecksumMap> {
    if !root.is_dir() {
        return Err(Error::NotFound(format!("directory {}", root.display())));
    }

    let keep = |entry: &DirEntry| -> bool {
        if entry.depth() == 0 {
            return true;
        }
        match relative_path(root, entry.path()) {
            Ok(relative) => !options.is_excluded(&relative),
            Err(_) => true,
        }
    };

    let mut map = ChecksumMap::new();
    for entry in WalkDir::new(root).follow_links(false).into_iter().filter_entry(keep) {
        let entry = entry.map_err(|e| Error::IoError(format!("walking {}: {}", root.display(), e)))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = relative_path(root, entry.path())?;
        let digest = hash::hash_file(options.algorithm, entry.path()).map_err(|e| {
            Error::IoError(format!("hashing {}: {}", entry.path().display(), e))
        })?;
        map.insert(relative, digest);
    }

    debug!("Hashed {} files under {}", map.len(), root.display());
    Ok(map)
}
