// src/manifest.rs

//! Backup manifest records
//!
//! One line per tracked file:
//!
//! ```text
//! <hash>    <type>    <path>
//! ```
//!
//! Fields are separated by exactly four spaces. `type` is `app` for files
//! of the application tree and `data` for files of auxiliary directories.
//! The path is the last field and may itself contain spaces.

use crate::access::{Access, mirror_all, remote_join};
use crate::checksum::{ChecksumMap, HashOptions, hash_tree};
use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

pub const SEPARATOR: &str = "    ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    App,
    Data,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::App => "app",
            EntryKind::Data => "data",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "app" => Ok(EntryKind::App),
            "data" => Ok(EntryKind::Data),
            _ => Err(format!("Invalid manifest entry type: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub hash: String,
    pub kind: EntryKind,
    pub path: String,
}

impl ManifestEntry {
    pub fn parse_line(line: &str) -> Result<Self> {
        let mut fields = line.splitn(3, SEPARATOR);
        let (Some(hash), Some(kind), Some(path)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(Error::ParseError(format!("manifest line has fewer than three fields: {line:?}")));
        };
        if hash.is_empty() || hash.contains(' ') || path.is_empty() {
            return Err(Error::ParseError(format!("malformed manifest line: {line:?}")));
        }

        Ok(Self {
            hash: hash.to_string(),
            kind: kind.parse().map_err(Error::ParseError)?,
            path: path.to_string(),
        })
    }
}

impl fmt::Display for ManifestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}{SEPARATOR}{}", self.hash, self.kind, self.path)
    }
}

/// Parse a whole manifest; blank lines are ignored
pub fn parse(text: &str) -> Result<Vec<ManifestEntry>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            ManifestEntry::parse_line(line)
                .map_err(|e| Error::ParseError(format!("line {}: {}", idx + 1, e)))
        })
        .collect()
}

/// Render entries, one per line, with a trailing newline
pub fn render(entries: &[ManifestEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&entry.to_string());
        out.push('\n');
    }
    out
}

/// Entries for a checksum map, paths placed under `base`
pub fn from_checksums(map: &ChecksumMap, kind: EntryKind, base: &str) -> Vec<ManifestEntry> {
    map.iter()
        .map(|(path, hash)| ManifestEntry {
            hash: hash.clone(),
            kind,
            path: remote_join(base, path),
        })
        .collect()
}

/// `data` entries for auxiliary directories on the host
///
/// Directories the backend can reach in place are hashed directly; the rest
/// are mirrored under `cache_root` first, all of them before any hashing so
/// that every failing directory is reported together.
pub fn data_entries(
    access: &dyn Access,
    dirs: &[String],
    cache_root: &Path,
    options: &HashOptions,
) -> Result<Vec<ManifestEntry>> {
    let mut trees: Vec<(&str, PathBuf)> = Vec::with_capacity(dirs.len());
    let mut pending = Vec::new();

    for (idx, dir) in dirs.iter().enumerate() {
        match access.local_root(dir) {
            Some(root) => trees.push((dir.as_str(), root)),
            None => {
                let target = cache_root.join(format!("data-{idx}"));
                pending.push((dir.clone(), target.clone()));
                trees.push((dir.as_str(), target));
            }
        }
    }

    if !pending.is_empty() {
        debug!("Mirroring {} data directories", pending.len());
        mirror_all(access, &pending)?;
    }

    let mut entries = Vec::new();
    for (dir, tree) in trees {
        let map = hash_tree(&tree, options)?;
        entries.extend(from_checksums(&map, EntryKind::Data, dir));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_format() {
        let entry = ManifestEntry {
            hash: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
            kind: EntryKind::App,
            path: "/var/www/index.php".to_string(),
        };
        assert_eq!(
            entry.to_string(),
            "d41d8cd98f00b204e9800998ecf8427e    app    /var/www/index.php"
        );
    }

    #[test]
    fn test_parse_keeps_spaces_in_path() {
        let entries = parse("ab    data    /srv/files/my  report.pdf\n\ncd    app    a.php\n").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, EntryKind::Data);
        assert_eq!(entries[0].path, "/srv/files/my  report.pdf");
        assert_eq!(render(&entries), "ab    data    /srv/files/my  report.pdf\ncd    app    a.php\n");
    }

    #[test]
    fn test_parse_errors_name_the_line() {
        let err = parse("ab    app    a.php\nab app a.php\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));

        assert!(ManifestEntry::parse_line("ab    tmp    a.php").is_err());
    }

    #[test]
    fn test_from_checksums() {
        let map: ChecksumMap = [("lib/a.php".to_string(), "ff".to_string())].into_iter().collect();
        let entries = from_checksums(&map, EntryKind::App, "/var/www/");
        assert_eq!(entries[0].path, "/var/www/lib/a.php");
        assert_eq!(entries[0].hash, "ff");
    }

    #[test]
    fn test_data_entries_local() {
        use crate::access::local::LocalAccess;

        let uploads = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(uploads.path().join("2024")).unwrap();
        std::fs::write(uploads.path().join("2024/photo.jpg"), b"jpeg").unwrap();

        let dir = uploads.path().to_string_lossy().to_string();
        let entries =
            data_entries(&LocalAccess::new(), &[dir.clone()], cache.path(), &HashOptions::default())
                .unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, EntryKind::Data);
        assert_eq!(entries[0].path, remote_join(&dir, "2024/photo.jpg"));
        assert_eq!(entries[0].hash, crate::hash::xxh128(b"jpeg"));
    }
}
