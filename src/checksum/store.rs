// src/checksum/store.rs

//! Baseline capture and live snapshots

use super::{ChecksumMap, HashOptions, hash_tree};
use crate::access::Access;
use crate::db::models::{ChecksumEntry, Instance, Version};
use crate::db::paths;
use crate::error::Result;
use crate::hash::HashAlgorithm;
use crate::source::SourceProvider;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::info;

/// Computes and persists checksum maps
///
/// Borrows the database connection; nothing here holds global state.
pub struct ChecksumStore<'a> {
    conn: &'a Connection,
    options: HashOptions,
    work_dir: PathBuf,
}

impl<'a> ChecksumStore<'a> {
    pub fn new(conn: &'a Connection, options: HashOptions, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            conn,
            options,
            work_dir: work_dir.into(),
        }
    }

    /// Algorithm new versions are hashed with
    pub fn algorithm(&self) -> HashAlgorithm {
        self.options.algorithm
    }

    fn options_for(&self, algorithm: HashAlgorithm) -> HashOptions {
        HashOptions {
            algorithm,
            exclude: self.options.exclude.clone(),
        }
    }

    /// Extract a clean tree for `version` into a fresh scratch directory
    ///
    /// The tree lives until the returned guard is dropped.
    pub fn extract_clean(&self, version: &Version, source: &dyn SourceProvider) -> Result<TempDir> {
        let scratch_root = paths::scratch_dir(&self.work_dir);
        fs::create_dir_all(&scratch_root)?;
        let scratch = tempfile::Builder::new()
            .prefix("clean-")
            .tempdir_in(&scratch_root)?;

        info!(
            "Extracting {} {} from {}",
            version.vcs,
            version.branch,
            source.describe()
        );
        source.extract(version, scratch.path())?;
        Ok(scratch)
    }

    /// Hash an extracted clean tree and make it the version's baseline
    pub fn record_baseline(&self, version: &Version, tree: &Path) -> Result<ChecksumMap> {
        let version_id = version.require_id()?;
        let map = hash_tree(tree, &self.options_for(version.hash_algorithm))?;
        let stored = ChecksumEntry::replace_all(self.conn, version_id, &map)?;
        info!("Stored baseline of {} files for version {}", stored, version_id);
        Ok(map)
    }

    /// Extract, hash and store the baseline of `version`; the scratch tree is removed
    pub fn capture_baseline(&self, version: &Version, source: &dyn SourceProvider) -> Result<ChecksumMap> {
        let scratch = self.extract_clean(version, source)?;
        self.record_baseline(version, scratch.path())
    }

    /// Hash the instance's live tree
    ///
    /// A web root readable on this machine is hashed in place. Otherwise it
    /// is mirrored into the instance's cache directory first, so every
    /// backend hashes the same bytes with the same code.
    pub fn capture_live(
        &self,
        instance: &Instance,
        access: &dyn Access,
        algorithm: HashAlgorithm,
    ) -> Result<ChecksumMap> {
        let options = self.options_for(algorithm);

        if let Some(root) = access.local_root(&instance.web_root) {
            return hash_tree(&root, &options);
        }

        let cache = paths::instance_cache_dir(&self.work_dir, instance.require_id()?);
        info!("Mirroring {}:{} for hashing", instance.name, instance.web_root);
        access.mirror_directory(&instance.web_root, &cache)?;
        hash_tree(&cache, &options)
    }

    /// Stored baseline of a version
    pub fn baseline(&self, version_id: i64) -> Result<ChecksumMap> {
        ChecksumEntry::map_for_version(self.conn, version_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::local::LocalAccess;
    use crate::db;
    use crate::db::models::{AccessKind, ApplicationKind, VcsKind, VersionAction};
    use crate::source::DirectorySource;

    fn setup(conn: &Connection, web_root: &Path) -> (Instance, Version) {
        let mut instance = Instance::new(
            "site".to_string(),
            web_root.to_string_lossy().to_string(),
            ApplicationKind::Static,
            AccessKind::Local,
        );
        let instance_id = instance.insert(conn).unwrap();
        let mut version =
            Version::new(instance_id, VcsKind::Src, "1.0".to_string(), VersionAction::Create);
        version.insert(conn).unwrap();
        (instance, version)
    }

    #[test]
    fn test_capture_baseline_replaces_and_cleans_up() {
        let conn = db::open_in_memory().unwrap();
        let work = tempfile::tempdir().unwrap();
        let release = tempfile::tempdir().unwrap();
        fs::write(release.path().join("index.html"), "v1").unwrap();
        fs::create_dir_all(release.path().join(".git")).unwrap();
        fs::write(release.path().join(".git/HEAD"), "ref").unwrap();

        let (_, version) = setup(&conn, release.path());
        let version_id = version.id.unwrap();
        ChecksumEntry::upsert(&conn, version_id, "stale.html", "00").unwrap();

        let store = ChecksumStore::new(&conn, HashOptions::default(), work.path());
        let map = store
            .capture_baseline(&version, &DirectorySource::new(release.path()))
            .unwrap();

        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["index.html"]);
        assert_eq!(store.baseline(version_id).unwrap(), map);
        // Scratch trees are gone
        let leftovers = fs::read_dir(paths::scratch_dir(work.path())).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_capture_live_local_in_place() {
        let conn = db::open_in_memory().unwrap();
        let work = tempfile::tempdir().unwrap();
        let web_root = tempfile::tempdir().unwrap();
        fs::write(web_root.path().join("index.html"), "live").unwrap();

        let (instance, _) = setup(&conn, web_root.path());
        let store = ChecksumStore::new(&conn, HashOptions::default(), work.path());
        let map = store
            .capture_live(&instance, &LocalAccess::new(), HashAlgorithm::Sha256)
            .unwrap();

        assert_eq!(map["index.html"].len(), HashAlgorithm::Sha256.hex_len());
        // Hashed in place, nothing cached
        assert!(!paths::cache_dir(work.path()).exists());
    }
}
