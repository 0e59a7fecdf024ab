// src/config.rs

//! Manager configuration
//!
//! Loaded from a TOML file. Every field has a default, so a missing file is
//! equivalent to an empty one. Lookup order for the file:
//! 1. explicit `--config` path
//! 2. `SITEWARD_CONFIG` environment variable
//! 3. `<config_dir>/siteward/config.toml`
//!
//! ```toml
//! db_path = "/var/lib/siteward/siteward.db"
//! work_dir = "/var/lib/siteward"
//!
//! [checksum]
//! algorithm = "xxh128"
//! exclude = [".git", ".svn", "temp/cache"]
//!
//! [transport]
//! ssh = "/usr/bin/ssh"
//! ```

use crate::access::AccessContext;
use crate::checksum::HashOptions;
use crate::db;
use crate::error::{Error, Result};
use crate::hash::HashAlgorithm;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "SITEWARD_CONFIG";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// SQLite database holding instances, versions and baselines
    pub db_path: PathBuf,
    /// Root for scratch extractions and live-tree caches
    pub work_dir: PathBuf,
    pub checksum: ChecksumConfig,
    pub transport: TransportConfig,
}

/// How trees are hashed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecksumConfig {
    pub algorithm: HashAlgorithm,
    /// File or directory names (or relative paths) never hashed
    pub exclude: Vec<String>,
}

/// External programs used by the remote backends
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub ssh: String,
    pub rsync: String,
    pub sshpass: String,
    pub curl: String,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/var/lib"))
        .join("siteward")
}

impl Default for ManagerConfig {
    fn default() -> Self {
        let work_dir = default_data_dir();
        Self {
            db_path: work_dir.join("siteward.db"),
            work_dir,
            checksum: ChecksumConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl Default for ChecksumConfig {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::Xxh128,
            exclude: vec![".git".to_string(), ".svn".to_string()],
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ssh: "ssh".to_string(),
            rsync: "rsync".to_string(),
            sshpass: "sshpass".to_string(),
            curl: "curl".to_string(),
        }
    }
}

impl ManagerConfig {
    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigError(e.to_string()))
    }

    /// Load configuration, falling back to defaults when no file exists
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path(),
        };

        match path {
            Some(path) if path.exists() => {
                debug!("Loading configuration from {}", path.display());
                let content = fs::read_to_string(&path).map_err(|e| {
                    Error::ConfigError(format!("cannot read {}: {}", path.display(), e))
                })?;
                Self::from_toml(&content)
            }
            Some(path) if explicit.is_some() => Err(Error::ConfigError(format!(
                "configuration file {} does not exist",
                path.display()
            ))),
            _ => Ok(Self::default()),
        }
    }

    /// Default configuration file location
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .or_else(|| dirs::config_dir().map(|dir| dir.join("siteward").join("config.toml")))
    }

    /// Hashing options for checksum maps
    pub fn hash_options(&self) -> HashOptions {
        HashOptions {
            algorithm: self.checksum.algorithm,
            exclude: self.checksum.exclude.clone(),
        }
    }

    /// Inputs for the transport backends
    pub fn access_context(&self) -> AccessContext {
        AccessContext::new(self.transport.clone(), db::paths::staging_dir(&self.work_dir))
    }

    /// Database path as a string, the form `db::open` takes
    pub fn db_path_str(&self) -> Result<&str> {
        self.db_path
            .to_str()
            .ok_or_else(|| Error::InvalidPath(self.db_path.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_is_default() {
        let config = ManagerConfig::from_toml("").unwrap();
        assert_eq!(config.checksum.algorithm, HashAlgorithm::Xxh128);
        assert_eq!(config.checksum.exclude, vec![".git", ".svn"]);
        assert_eq!(config.transport.ssh, "ssh");
    }

    #[test]
    fn test_partial_toml() {
        let config = ManagerConfig::from_toml(
            r#"
            db_path = "/srv/siteward/state.db"

            [checksum]
            algorithm = "sha256"

            [transport]
            rsync = "/opt/bin/rsync"
            "#,
        )
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/srv/siteward/state.db"));
        assert_eq!(config.checksum.algorithm, HashAlgorithm::Sha256);
        assert_eq!(config.checksum.exclude, vec![".git", ".svn"]);
        assert_eq!(config.transport.rsync, "/opt/bin/rsync");
        assert_eq!(config.transport.sshpass, "sshpass");
    }

    #[test]
    fn test_invalid_toml() {
        let result = ManagerConfig::from_toml("db_path = [");
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_load_explicit_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = ManagerConfig::load(Some(&dir.path().join("missing.toml")));
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "work_dir = \"/tmp/siteward-work\"\n").unwrap();

        let config = ManagerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.work_dir, PathBuf::from("/tmp/siteward-work"));
    }
}
