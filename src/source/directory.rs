// src/source/directory.rs

use super::SourceProvider;
use crate::db::models::Version;
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Release trees kept in a directory, one subdirectory per branch or tag
///
/// A root with regular files at its top level is itself a single release
/// tree and serves every branch. A root holding only directories must
/// contain `<root>/<branch>`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn tree_for(&self, version: &Version) -> Result<PathBuf> {
        if !self.root.is_dir() {
            return Err(Error::NotFound(format!("source directory {}", self.root.display())));
        }
        if version.branch.contains("..") {
            return Err(Error::InvalidPath(format!("branch {}", version.branch)));
        }

        let branch = self.root.join(&version.branch);
        if !version.branch.is_empty() && branch.is_dir() {
            return Ok(branch);
        }
        if version.branch.is_empty() || self.is_release_tree()? {
            return Ok(self.root.clone());
        }
        Err(Error::NotFound(format!(
            "branch {} in {}",
            version.branch,
            self.root.display()
        )))
    }

    fn is_release_tree(&self) -> Result<bool> {
        for entry in fs::read_dir(&self.root)? {
            if entry?.file_type()?.is_file() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl SourceProvider for DirectorySource {
    fn extract(&self, version: &Version, dest: &Path) -> Result<()> {
        let tree = self.tree_for(version)?;
        let copied = copy_tree(&tree, dest)?;
        debug!("Copied {} files from {}", copied, tree.display());
        Ok(())
    }

    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }
}

/// Copy every directory and regular file under `src` into `dest`
///
/// Symlinks are skipped. Returns the number of files copied.
pub fn copy_tree(src: &Path, dest: &Path) -> Result<usize> {
    fs::create_dir_all(dest)?;
    let mut files = 0usize;

    for entry in WalkDir::new(src).follow_links(false).min_depth(1) {
        let entry = entry.map_err(|e| Error::IoError(format!("walking {}: {}", src.display(), e)))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|_| Error::InvalidPath(entry.path().display().to_string()))?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target).map_err(|e| {
                Error::IoError(format!("copying {}: {}", entry.path().display(), e))
            })?;
            files += 1;
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{VcsKind, VersionAction};

    fn version(branch: &str) -> Version {
        Version::new(1, VcsKind::Src, branch.to_string(), VersionAction::Create)
    }

    #[test]
    fn test_branch_subdirectory() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("2.0/lib")).unwrap();
        fs::write(root.path().join("2.0/lib/a.php"), "a2").unwrap();
        fs::write(root.path().join("top.php"), "top").unwrap();

        let dest = tempfile::tempdir().unwrap();
        let out = dest.path().join("clean");
        DirectorySource::new(root.path()).extract(&version("2.0"), &out).unwrap();

        assert_eq!(fs::read_to_string(out.join("lib/a.php")).unwrap(), "a2");
        assert!(!out.join("top.php").exists());
    }

    #[test]
    fn test_root_when_no_branch_directory() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("index.html"), "hi").unwrap();

        let dest = tempfile::tempdir().unwrap();
        DirectorySource::new(root.path()).extract(&version("main"), dest.path()).unwrap();
        assert!(dest.path().join("index.html").exists());
    }

    #[test]
    fn test_missing_root() {
        let root = tempfile::tempdir().unwrap();
        let source = DirectorySource::new(root.path().join("absent"));
        let result = source.extract(&version("1.0"), root.path());
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_missing_branch_among_releases() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("1.0")).unwrap();
        fs::write(root.path().join("1.0/index.html"), "v1").unwrap();
        fs::create_dir_all(root.path().join("2.0")).unwrap();
        fs::write(root.path().join("2.0/index.html"), "v2").unwrap();

        let dest = tempfile::tempdir().unwrap();
        let out = dest.path().join("clean");
        let result = DirectorySource::new(root.path()).extract(&version("2.1"), &out);

        match result {
            Err(Error::NotFound(message)) => assert!(message.contains("branch 2.1")),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(!out.exists());
    }

    #[test]
    fn test_rejects_parent_branch() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("index.html"), "hi").unwrap();
        let result = DirectorySource::new(root.path()).extract(&version("../etc"), root.path());
        assert!(matches!(result, Err(Error::InvalidPath(_))));
    }
}
