// src/source/mod.rs

//! Clean copies of the managed software
//!
//! A source provider materializes the pristine tree for a Version (a
//! branch or tag of the application) into a scratch directory. Baselines
//! are hashed from these clean extractions, never from a live host.

mod directory;
mod tarball;

pub use directory::{DirectorySource, copy_tree};
pub use tarball::TarballSource;

use crate::db::models::{VcsKind, Version};
use crate::error::{Error, Result};
use std::path::Path;

/// Produces the clean tree a Version describes
pub trait SourceProvider {
    /// Write the tree for `version` into `dest`, which is empty or absent
    fn extract(&self, version: &Version, dest: &Path) -> Result<()>;

    /// Short label for logs
    fn describe(&self) -> String;
}

/// Provider for a version-control kind rooted at `location`
pub fn open(vcs: VcsKind, location: &Path) -> Result<Box<dyn SourceProvider>> {
    match vcs {
        VcsKind::Src => Ok(Box::new(DirectorySource::new(location))),
        VcsKind::Tarball => Ok(Box::new(TarballSource::new(location))),
        VcsKind::Git | VcsKind::Svn => Err(Error::Unsupported(format!(
            "{vcs} checkouts are managed by the application, not by siteward"
        ))),
    }
}
