// src/access/mod.rs

//! Uniform remote operations over local, ssh and ftp hosts
//!
//! Every backend implements [`Access`]. Callers never branch on which
//! backend they hold; they branch on [`Capabilities`], on whether
//! [`Access::as_shell`] yields a shell, and on whether
//! [`Access::local_root`] says a path is readable in place.
//!
//! Remote paths are plain `/`-separated strings, local paths are `Path`s.

pub mod command;
pub mod ftp;
pub mod local;
mod registry;
pub mod ssh;
pub mod transfer;

pub use command::{CommandOutput, CommandSpec, ProcessRunner, SystemRunner};
pub use registry::{AccessContext, AccessFactory, AccessRegistry};

use crate::db::models::AccessKind;
use crate::error::{Error, MirrorError, MirrorFailure, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// What a backend can do, as data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// Arbitrary commands with cwd, environment and stdin control
    pub shell: bool,
    /// Only file transfers; scripts need a side channel
    pub transfer_only: bool,
    /// Mirrors copy only what changed
    pub delta_mirror: bool,
}

/// How a backend proved it may act on the host
///
/// Ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMethod {
    Anonymous,
    Password,
    PublicKey,
    Local,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Anonymous => "anonymous",
            AuthMethod::Password => "password",
            AuthMethod::PublicKey => "public-key",
            AuthMethod::Local => "local",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful `connect()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Handshake {
    pub auth: AuthMethod,
    pub capabilities: Capabilities,
}

/// Operations every backend provides
pub trait Access {
    fn kind(&self) -> AccessKind;

    fn capabilities(&self) -> Capabilities;

    /// One-time handshake; repeated calls return the first proven result
    fn connect(&mut self) -> Result<Handshake>;

    fn file_exists(&self, path: &str) -> Result<bool>;

    fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    fn modification_time(&self, path: &str) -> Result<DateTime<Utc>>;

    /// Copy a local file to `remote`, creating missing parent directories
    fn upload_file(&self, local: &Path, remote: &str) -> Result<()>;

    /// Copy `remote` to `local`, returning the path written
    fn download_file(&self, remote: &str, local: &Path) -> Result<PathBuf>;

    fn delete_file(&self, path: &str) -> Result<()>;

    fn move_file(&self, src: &str, dst: &str) -> Result<()>;

    /// Run a local script file on the host with `interpreter`
    ///
    /// A non-zero exit is reported in the output, not as an error.
    fn run_script(&self, interpreter: &str, script: &Path, args: &[String]) -> Result<CommandOutput>;

    /// Make `local_dir` an exact copy of `remote_dir`
    fn mirror_directory(&self, remote_dir: &str, local_dir: &Path) -> Result<()>;

    /// The shell interface, when the backend has one
    fn as_shell(&self) -> Option<&dyn ShellAccess> {
        None
    }

    /// Local path of `path` when it is directly readable on this machine
    fn local_root(&self, _path: &str) -> Option<PathBuf> {
        None
    }
}

/// Arbitrary command execution on the host
pub trait ShellAccess {
    fn shell_exec(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// Mirror several remote directories, reporting every failure at once
///
/// A failing pair never stops the remaining ones.
pub fn mirror_all(access: &dyn Access, pairs: &[(String, PathBuf)]) -> Result<()> {
    let mut aggregate = MirrorError::default();

    for (remote, local) in pairs {
        info!("Mirroring {} to {}", remote, local.display());
        match access.mirror_directory(remote, local) {
            Ok(()) => {}
            Err(Error::MirrorError(err)) => {
                warn!("Mirror of {} failed: {}", remote, err);
                aggregate.failures.extend(err.failures);
            }
            Err(err) => {
                warn!("Mirror of {} failed: {}", remote, err);
                aggregate.failures.push(MirrorFailure {
                    path: remote.clone(),
                    code: native_code(&err),
                    message: err.to_string(),
                });
            }
        }
    }

    if aggregate.is_empty() {
        Ok(())
    } else {
        Err(Error::MirrorError(aggregate))
    }
}

fn native_code(err: &Error) -> i32 {
    match err {
        Error::CommandFailed { code, .. } => *code,
        Error::Io(e) => e.raw_os_error().unwrap_or(-1),
        _ => -1,
    }
}

/// Join a remote directory and a relative path with exactly one `/`
pub fn remote_join(base: &str, relative: &str) -> String {
    let relative = relative.trim_start_matches('/');
    if base.is_empty() {
        relative.to_string()
    } else if relative.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), relative)
    }
}

/// Parent directory of a remote path, if it has one
pub fn remote_parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&trimmed[..idx]),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::local::LocalAccess;
    use std::fs;

    #[test]
    fn test_auth_method_order() {
        assert!(AuthMethod::Anonymous < AuthMethod::Password);
        assert!(AuthMethod::Password < AuthMethod::PublicKey);
        assert!(AuthMethod::PublicKey < AuthMethod::Local);
    }

    #[test]
    fn test_remote_join_and_parent() {
        assert_eq!(remote_join("/var/www/", "/index.php"), "/var/www/index.php");
        assert_eq!(remote_join("/var/www", ""), "/var/www");
        assert_eq!(remote_parent("/var/www/index.php"), Some("/var/www"));
        assert_eq!(remote_parent("/index.php"), Some("/"));
        assert_eq!(remote_parent("index.php"), None);
    }

    #[test]
    fn test_mirror_all_aggregates_failures() {
        let remote = tempfile::tempdir().unwrap();
        let local = tempfile::tempdir().unwrap();
        fs::create_dir_all(remote.path().join("themes")).unwrap();
        fs::write(remote.path().join("themes/a.css"), "a").unwrap();

        let access = LocalAccess::new();
        let root = remote.path().to_string_lossy().to_string();
        let pairs = vec![
            (remote_join(&root, "missing-one"), local.path().join("one")),
            (remote_join(&root, "themes"), local.path().join("themes")),
            (remote_join(&root, "missing-two"), local.path().join("two")),
        ];

        match mirror_all(&access, &pairs) {
            Err(Error::MirrorError(err)) => {
                assert_eq!(err.failures.len(), 2);
                assert!(err.paths()[0].ends_with("missing-one"));
                assert!(err.paths()[1].ends_with("missing-two"));
            }
            other => panic!("expected aggregated mirror error, got {:?}", other),
        }

        // The good pair in the middle still ran
        assert!(local.path().join("themes/a.css").exists());
    }
}
