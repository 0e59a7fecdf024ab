// src/archive.rs

//! Gzip-compressed tar extraction
//!
//! Used for release tarballs and for the archives the ftp backend pulls
//! from a host. Only directories and regular files are materialized; links
//! and device nodes are skipped. Entries that would land outside the
//! destination are rejected.

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};
use tracing::debug;

/// Entry path with `strip` leading components removed, or `None` if nothing is left
fn stripped_path(path: &Path, strip: usize) -> Result<Option<PathBuf>> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_os_string()),
            Component::CurDir => {}
            _ => {
                return Err(Error::InvalidPath(format!(
                    "archive entry {} escapes the destination",
                    path.display()
                )));
            }
        }
    }
    if parts.len() <= strip {
        return Ok(None);
    }
    Ok(Some(parts[strip..].iter().collect()))
}

/// Unpack `archive` into `dest`, dropping `strip` leading path components
///
/// Returns the number of regular files written.
pub fn unpack_tar_gz(archive: &Path, dest: &Path, strip: usize) -> Result<usize> {
    let file = File::open(archive)
        .map_err(|e| Error::IoError(format!("Failed to open {}: {}", archive.display(), e)))?;
    let mut tar = Archive::new(GzDecoder::new(file));
    fs::create_dir_all(dest)?;

    let mut files = 0usize;
    for entry in tar
        .entries()
        .map_err(|e| Error::ParseError(format!("Failed to read {}: {}", archive.display(), e)))?
    {
        let mut entry = entry
            .map_err(|e| Error::ParseError(format!("Failed to read {}: {}", archive.display(), e)))?;
        let entry_path = entry.path()?.into_owned();
        let Some(relative) = stripped_path(&entry_path, strip)? else {
            continue;
        };
        let target = dest.join(&relative);

        match entry.header().entry_type() {
            EntryType::Directory => fs::create_dir_all(&target)?,
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut out = File::create(&target)?;
                io::copy(&mut entry, &mut out)?;
                files += 1;
            }
            other => debug!("Skipping {:?} entry {}", other, entry_path.display()),
        }
    }

    debug!("Unpacked {} files from {} into {}", files, archive.display(), dest.display());
    Ok(files)
}

/// Number of leading components shared by every entry: 1 when the archive
/// holds a single top-level directory, else 0
pub fn common_root_depth(archive: &Path) -> Result<usize> {
    let file = File::open(archive)
        .map_err(|e| Error::IoError(format!("Failed to open {}: {}", archive.display(), e)))?;
    let mut tar = Archive::new(GzDecoder::new(file));

    let mut root: Option<std::ffi::OsString> = None;
    for entry in tar
        .entries()
        .map_err(|e| Error::ParseError(format!("Failed to read {}: {}", archive.display(), e)))?
    {
        let entry = entry
            .map_err(|e| Error::ParseError(format!("Failed to read {}: {}", archive.display(), e)))?;
        let path = entry.path()?.into_owned();
        let mut normal = path.components().filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_os_string()),
            _ => None,
        });
        let Some(first) = normal.next() else {
            continue;
        };
        // A regular file at the top means there is no wrapping directory
        if normal.next().is_none() && entry.header().entry_type() != EntryType::Directory {
            return Ok(0);
        }
        match &root {
            None => root = Some(first),
            Some(existing) if *existing == first => {}
            Some(_) => return Ok(0),
        }
    }
    Ok(usize::from(root.is_some()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    fn build(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(EntryType::Regular);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_unpack_with_strip() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("release.tar.gz");
        build(&archive, &[("site-1.0/index.php", b"i"), ("site-1.0/lib/a.php", b"a")]);

        assert_eq!(common_root_depth(&archive).unwrap(), 1);

        let dest = dir.path().join("out");
        assert_eq!(unpack_tar_gz(&archive, &dest, 1).unwrap(), 2);
        assert_eq!(fs::read(dest.join("index.php")).unwrap(), b"i");
        assert_eq!(fs::read(dest.join("lib/a.php")).unwrap(), b"a");
    }

    #[test]
    fn test_flat_archive_has_no_root() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("flat.tar.gz");
        build(&archive, &[("index.php", b"i"), ("lib/a.php", b"a")]);

        assert_eq!(common_root_depth(&archive).unwrap(), 0);
    }

    #[test]
    fn test_stripped_path_rejects_parent() {
        assert!(matches!(
            stripped_path(Path::new("../etc/passwd"), 0),
            Err(Error::InvalidPath(_))
        ));
        assert_eq!(stripped_path(Path::new("./top"), 1).unwrap(), None);
        assert_eq!(
            stripped_path(Path::new("top/a/b"), 1).unwrap(),
            Some(PathBuf::from("a/b"))
        );
    }
}
