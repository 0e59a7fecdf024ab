// src/source/tarball.rs

use super::SourceProvider;
use crate::archive;
use crate::db::models::Version;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Release tarballs named `<branch>.tar.gz`
///
/// `location` is either a directory of tarballs or a single tarball used
/// for every version. A single wrapping top-level directory is stripped.
#[derive(Debug, Clone)]
pub struct TarballSource {
    location: PathBuf,
}

impl TarballSource {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
        }
    }

    fn archive_for(&self, version: &Version) -> Result<PathBuf> {
        if self.location.is_file() {
            return Ok(self.location.clone());
        }
        if version.branch.contains('/') || version.branch.contains("..") {
            return Err(Error::InvalidPath(format!("branch {}", version.branch)));
        }
        let archive = self.location.join(format!("{}.tar.gz", version.branch));
        if archive.is_file() {
            Ok(archive)
        } else {
            Err(Error::NotFound(format!("tarball {}", archive.display())))
        }
    }
}

impl SourceProvider for TarballSource {
    fn extract(&self, version: &Version, dest: &Path) -> Result<()> {
        let archive_path = self.archive_for(version)?;
        let strip = archive::common_root_depth(&archive_path)?;
        let files = archive::unpack_tar_gz(&archive_path, dest, strip)?;
        debug!("Extracted {} files from {}", files, archive_path.display());
        Ok(())
    }

    fn describe(&self) -> String {
        format!("tarball {}", self.location.display())
    }
}
