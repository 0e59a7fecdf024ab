// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use rusqlite::Connection;
use siteward::access::ftp::{ARTIFACT_PREFIX, FtpAccess, ScriptGateway};
use siteward::access::transfer::DirectoryTransfer;
use siteward::checksum::ChecksumMap;
use siteward::db;
use siteward::db::models::{AccessKind, ApplicationKind, Instance};
use siteward::{CommandOutput, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Create a file-backed database with the full schema.
///
/// Returns (TempDir, Connection) - keep the TempDir alive to prevent cleanup.
pub fn setup_db() -> (TempDir, Connection) {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("siteward.db");
    let db_path = db_path.to_str().unwrap();

    db::init(db_path).unwrap();
    let conn = db::open(db_path).unwrap();
    (temp_dir, conn)
}

/// Build a checksum map from literal pairs.
pub fn map(entries: &[(&str, &str)]) -> ChecksumMap {
    entries
        .iter()
        .map(|(path, hash)| (path.to_string(), hash.to_string()))
        .collect()
}

/// Write `(relative path, content)` pairs under `root`.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (path, content) in files {
        let target = root.join(path);
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(target, content).unwrap();
    }
}

/// Insert an instance with the given access kind and web root.
pub fn add_instance(
    conn: &Connection,
    name: &str,
    web_root: &str,
    app: ApplicationKind,
    access: AccessKind,
) -> Instance {
    let mut instance = Instance::new(name.to_string(), web_root.to_string(), app, access);
    instance.insert(conn).unwrap();
    instance
}

/// Stand-in for a web server: runs the pack script by archiving the
/// requested directory below `root` with tar and gzip, leaving out the
/// files the backend itself placed there. Arguments are resolved against
/// the script's own directory.
pub struct PackingGateway {
    root: PathBuf,
}

impl PackingGateway {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn local(&self, remote: &str) -> PathBuf {
        self.root.join(remote.trim_start_matches('/'))
    }
}

impl ScriptGateway for PackingGateway {
    fn execute(&self, remote_script: &str, args: &[String]) -> Result<CommandOutput> {
        let script = self.local(remote_script);
        let script_dir = script.parent().unwrap();
        let dir = script_dir.join(&args[0]);
        if !dir.is_dir() {
            return Ok(CommandOutput {
                stdout: Vec::new(),
                stderr: b"usage: pack <directory> <archive.tar>".to_vec(),
                exit_code: 400,
            });
        }

        let archive = format!("{}.gz", args[1]);
        let file = File::create(script_dir.join(&archive))?;
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);

        for entry in walkdir::WalkDir::new(&dir).min_depth(1) {
            let entry = entry.unwrap();
            let ours = entry.file_name().to_string_lossy().starts_with(ARTIFACT_PREFIX);
            if entry.file_type().is_file() && !ours {
                let name = entry.path().strip_prefix(&dir).unwrap();
                builder.append_path_with_name(entry.path(), name)?;
            }
        }
        builder.into_inner()?.finish()?;

        Ok(CommandOutput {
            stdout: archive.into_bytes(),
            stderr: Vec::new(),
            exit_code: 0,
        })
    }
}

/// Transfer-only access whose "host" is the directory `host_root`.
pub fn ftp_access(host_root: &Path, web_root: &str, staging: &Path) -> FtpAccess {
    FtpAccess::new(
        "ftp.test",
        web_root,
        false,
        staging,
        Box::new(DirectoryTransfer::new(host_root)),
        Some(Box::new(PackingGateway::new(host_root))),
    )
}
