// src/access/local.rs

//! Local backend: direct filesystem and process access

use super::command::{CommandOutput, CommandSpec, ProcessRunner, SystemRunner};
use super::{Access, AccessContext, AuthMethod, Capabilities, Handshake, ShellAccess};
use crate::db::models::{AccessKind, Instance};
use crate::error::{Error, MirrorError, Result};
use crate::hash::{self, HashAlgorithm};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

const CAPABILITIES: Capabilities = Capabilities {
    shell: true,
    transfer_only: false,
    delta_mirror: true,
};

/// Backend for instances living on this machine
pub struct LocalAccess {
    runner: Arc<dyn ProcessRunner>,
}

impl LocalAccess {
    pub fn new() -> Self {
        Self::with_runner(Arc::new(SystemRunner))
    }

    pub fn with_runner(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }
}

impl Default for LocalAccess {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry factory
pub fn open(_instance: &Instance, context: &AccessContext) -> Result<Box<dyn Access>> {
    Ok(Box::new(LocalAccess::with_runner(context.runner.clone())))
}

fn transfer_error(operation: &'static str, path: &Path, err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::NotFound {
        Error::NotFound(path.display().to_string())
    } else {
        Error::TransferError {
            operation,
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

fn ensure_parent(path: &Path, operation: &'static str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| transfer_error(operation, parent, e))?;
    }
    Ok(())
}

impl Access for LocalAccess {
    fn kind(&self) -> AccessKind {
        AccessKind::Local
    }

    fn capabilities(&self) -> Capabilities {
        CAPABILITIES
    }

    fn connect(&mut self) -> Result<Handshake> {
        Ok(Handshake {
            auth: AuthMethod::Local,
            capabilities: CAPABILITIES,
        })
    }

    fn file_exists(&self, path: &str) -> Result<bool> {
        Ok(Path::new(path).exists())
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        fs::read(path).map_err(|e| transfer_error("read", Path::new(path), e))
    }

    fn modification_time(&self, path: &str) -> Result<DateTime<Utc>> {
        let modified = fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(|e| transfer_error("stat", Path::new(path), e))?;
        Ok(DateTime::<Utc>::from(modified))
    }

    fn upload_file(&self, local: &Path, remote: &str) -> Result<()> {
        let target = Path::new(remote);
        ensure_parent(target, "upload")?;
        fs::copy(local, target).map_err(|e| transfer_error("upload", local, e))?;
        Ok(())
    }

    fn download_file(&self, remote: &str, local: &Path) -> Result<PathBuf> {
        ensure_parent(local, "download")?;
        fs::copy(remote, local).map_err(|e| transfer_error("download", Path::new(remote), e))?;
        Ok(local.to_path_buf())
    }

    fn delete_file(&self, path: &str) -> Result<()> {
        fs::remove_file(path).map_err(|e| transfer_error("delete", Path::new(path), e))
    }

    fn move_file(&self, src: &str, dst: &str) -> Result<()> {
        let target = Path::new(dst);
        ensure_parent(target, "move")?;
        if let Err(err) = fs::rename(src, target) {
            if err.kind() == io::ErrorKind::NotFound {
                return Err(Error::NotFound(src.to_string()));
            }
            // Different filesystems: fall back to copy and remove
            debug!("rename {} -> {} failed ({}), copying", src, dst, err);
            fs::copy(src, target).map_err(|_| transfer_error("move", Path::new(src), err))?;
            fs::remove_file(src).map_err(|e| transfer_error("move", Path::new(src), e))?;
        }
        Ok(())
    }

    fn run_script(&self, interpreter: &str, script: &Path, args: &[String]) -> Result<CommandOutput> {
        let spec = CommandSpec::new(interpreter)
            .arg(script.to_string_lossy())
            .args(args.iter().cloned());
        self.runner.run(&spec)
    }

    fn mirror_directory(&self, remote_dir: &str, local_dir: &Path) -> Result<()> {
        let source = Path::new(remote_dir);
        if !source.is_dir() {
            return Err(MirrorError::single(remote_dir, 2, "no such directory").into());
        }
        sync_tree(source, local_dir)
            .map_err(|e| MirrorError::single(remote_dir, e.raw_os_error().unwrap_or(-1), e.to_string()).into())
    }

    fn as_shell(&self) -> Option<&dyn ShellAccess> {
        Some(self)
    }

    fn local_root(&self, path: &str) -> Option<PathBuf> {
        Some(PathBuf::from(path))
    }
}

impl ShellAccess for LocalAccess {
    fn shell_exec(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.runner.run(spec)
    }
}

fn same_content(a: &Path, b: &Path) -> io::Result<bool> {
    let (meta_a, meta_b) = match (fs::metadata(a), fs::symlink_metadata(b)) {
        (Ok(ma), Ok(mb)) => (ma, mb),
        (Err(e), _) => return Err(e),
        (_, Err(_)) => return Ok(false),
    };
    if !meta_b.is_file() || meta_a.len() != meta_b.len() {
        return Ok(false);
    }
    Ok(hash::hash_file(HashAlgorithm::Xxh128, a)? == hash::hash_file(HashAlgorithm::Xxh128, b)?)
}

/// Delta sync: copy changed regular files, remove everything extraneous
///
/// Symlinks in the source are skipped.
fn sync_tree(source: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;

    let mut wanted = BTreeSet::new();
    let mut copied = 0usize;

    for entry in WalkDir::new(source).follow_links(false).min_depth(1) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?
            .to_path_buf();
        let target = dest.join(&relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            if target.is_file() || target.is_symlink() {
                fs::remove_file(&target)?;
            }
            fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            if target.is_dir() && !target.is_symlink() {
                fs::remove_dir_all(&target)?;
            }
            if !same_content(entry.path(), &target)? {
                if target.is_symlink() {
                    fs::remove_file(&target)?;
                }
                fs::copy(entry.path(), &target)?;
                copied += 1;
            }
        } else {
            continue;
        }
        wanted.insert(relative);
    }

    // Deepest first so directories are empty by the time they are removed
    let mut removed = 0usize;
    for entry in WalkDir::new(dest).follow_links(false).min_depth(1).contents_first(true) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry.path().strip_prefix(dest).map_err(io::Error::other)?;
        if wanted.contains(relative) {
            continue;
        }
        if entry.file_type().is_dir() {
            fs::remove_dir_all(entry.path())?;
        } else {
            fs::remove_file(entry.path())?;
        }
        removed += 1;
    }

    debug!(
        "Synced {} -> {}: {} copied, {} removed",
        source.display(),
        dest.display(),
        copied,
        removed
    );
    Ok(())
}
