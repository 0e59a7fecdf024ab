// src/access/ftp.rs

//! File-transfer-only backend
//!
//! FTP hosts cannot run commands. Scripts are uploaded into the web root and
//! executed by requesting them over HTTP from the instance's web URL, then
//! deleted. Directory mirrors are built on top of that: a packing script
//! archives the remote tree, the archive is downloaded and unpacked into a
//! fresh local tree that replaces the destination.
//!
//! The packing script receives its paths relative to its own directory, the
//! web root. FTP accounts are often chrooted, so an FTP path like `/www`
//! names something else entirely for PHP; only the relation between two
//! FTP paths carries over. A directory outside the part of the host the
//! FTP account can see cannot be mirrored.

use super::command::CommandOutput;
use super::transfer::{CurlTransfer, FileTransfer};
use super::{Access, AccessContext, AuthMethod, Capabilities, Handshake, remote_join};
use crate::archive;
use crate::db::models::{AccessKind, Instance};
use crate::error::{Error, MirrorError, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;

const CAPABILITIES: Capabilities = Capabilities {
    shell: false,
    transfer_only: true,
    delta_mirror: false,
};

/// Name prefix of the scripts and archives this backend leaves in the web root
pub const ARTIFACT_PREFIX: &str = ".siteward-";

/// Archives `args[0]` into `args[1].gz` and prints the archive path
///
/// Both arguments are relative to the script's directory. Files named with
/// [`ARTIFACT_PREFIX`] (the script itself, the archive being written) are
/// left out.
pub const PACK_SCRIPT: &str = r#"<?php
$args = isset($_GET['args']) ? $_GET['args'] : array();
$dir = count($args) > 0 ? __DIR__ . '/' . $args[0] : '';
if (count($args) < 2 || !is_dir($dir)) {
    http_response_code(400);
    echo "usage: pack <directory> <archive.tar>";
    exit;
}
$archive = __DIR__ . '/' . $args[1];
try {
    $tar = new PharData($archive);
    $tar->buildFromDirectory($dir, '#^(?!.*/\.siteward-)#');
    $tar->compress(Phar::GZ);
    unset($tar);
    @unlink($archive);
    echo $args[1] . '.gz';
} catch (Exception $e) {
    http_response_code(500);
    echo $e->getMessage();
}
"#;

/// Executes a script already placed on the host
pub trait ScriptGateway {
    /// `remote_script` is an absolute path under the web root
    fn execute(&self, remote_script: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Runs scripts by requesting them from the site's web server
pub struct HttpGateway {
    web_root: String,
    web_url: Url,
    client: reqwest::blocking::Client,
}

impl HttpGateway {
    pub fn new(web_root: impl Into<String>, web_url: &str) -> Result<Self> {
        let mut web_url = Url::parse(web_url)
            .map_err(|e| Error::ConfigError(format!("invalid web URL {web_url}: {e}")))?;
        if !web_url.path().ends_with('/') {
            let path = format!("{}/", web_url.path());
            web_url.set_path(&path);
        }
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("siteward/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::ConfigError(format!("HTTP client: {e}")))?;
        Ok(Self {
            web_root: web_root.into(),
            web_url,
            client,
        })
    }

    /// URL serving `remote_script`
    pub fn script_url(&self, remote_script: &str, args: &[String]) -> Result<Url> {
        let root = self.web_root.trim_end_matches('/');
        let relative = remote_script
            .strip_prefix(root)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| {
                Error::InvalidPath(format!("{remote_script} is not under web root {root}"))
            })?;

        let mut url = self
            .web_url
            .join(relative)
            .map_err(|e| Error::InvalidPath(format!("{relative}: {e}")))?;
        if !args.is_empty() {
            let mut query = url.query_pairs_mut();
            for arg in args {
                query.append_pair("args[]", arg);
            }
        }
        Ok(url)
    }
}

impl ScriptGateway for HttpGateway {
    fn execute(&self, remote_script: &str, args: &[String]) -> Result<CommandOutput> {
        let url = self.script_url(remote_script, args)?;
        debug!("Requesting {}", url.path());

        let response = self.client.get(url.clone()).send().map_err(|e| Error::ConnectionError {
            host: url.host_str().unwrap_or_default().to_string(),
            message: e.to_string(),
        })?;
        let status = response.status();
        let body = response
            .bytes()
            .map_err(|e| Error::IoError(format!("reading response from {}: {}", url.path(), e)))?
            .to_vec();

        Ok(if status.is_success() {
            CommandOutput {
                stdout: body,
                stderr: Vec::new(),
                exit_code: 0,
            }
        } else {
            CommandOutput {
                stdout: Vec::new(),
                stderr: body,
                exit_code: i32::from(status.as_u16()),
            }
        })
    }
}

/// Backend for hosts offering only file transfer
pub struct FtpAccess {
    host: String,
    web_root: String,
    anonymous: bool,
    staging_dir: PathBuf,
    transfer: Box<dyn FileTransfer>,
    gateway: Option<Box<dyn ScriptGateway>>,
    auth: Option<AuthMethod>,
}

/// Registry factory
pub fn open(instance: &Instance, context: &AccessContext) -> Result<Box<dyn Access>> {
    let credentials = &instance.credentials;
    let host = credentials
        .host
        .clone()
        .ok_or_else(|| Error::ConfigError("ftp access requires a host".to_string()))?;
    which::which(&context.transport.curl).map_err(|e| Error::ConnectionError {
        host: host.clone(),
        message: format!("{} not available: {}", context.transport.curl, e),
    })?;

    let transfer = CurlTransfer::new(
        context.transport.curl.clone(),
        host.clone(),
        credentials.port.unwrap_or(21),
        credentials.user.clone(),
        credentials.secret.clone(),
        context.runner.clone(),
    )?;
    let gateway = match &instance.web_url {
        Some(url) => Some(Box::new(HttpGateway::new(instance.web_root.clone(), url)?) as Box<dyn ScriptGateway>),
        None => None,
    };

    Ok(Box::new(FtpAccess::new(
        host,
        instance.web_root.clone(),
        credentials.user.is_none(),
        context.staging_dir.clone(),
        Box::new(transfer),
        gateway,
    )))
}

impl FtpAccess {
    pub fn new(
        host: impl Into<String>,
        web_root: impl Into<String>,
        anonymous: bool,
        staging_dir: impl Into<PathBuf>,
        transfer: Box<dyn FileTransfer>,
        gateway: Option<Box<dyn ScriptGateway>>,
    ) -> Self {
        Self {
            host: host.into(),
            web_root: web_root.into(),
            anonymous,
            staging_dir: staging_dir.into(),
            transfer,
            gateway,
            auth: None,
        }
    }

    fn gateway(&self) -> Result<&dyn ScriptGateway> {
        self.gateway
            .as_deref()
            .ok_or_else(|| Error::Unsupported(format!("running scripts on {} needs a web URL", self.host)))
    }

    fn staging_file(&self, name: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.staging_dir)?;
        Ok(self
            .staging_dir
            .join(format!("{}-{}", uuid::Uuid::new_v4().simple(), name)))
    }

    /// Remote name in the web root that the web server will execute
    fn web_script_name(&self, extension: &str) -> String {
        remote_join(
            &self.web_root,
            &format!("{}{}.{}", ARTIFACT_PREFIX, uuid::Uuid::new_v4().simple(), extension),
        )
    }

    fn remove_remote(&self, path: &str) {
        if let Err(err) = self.transfer.delete(path) {
            warn!("Failed to remove {} from {}: {}", path, self.host, err);
        }
    }

    /// Replace `local_dir` with the contents of a downloaded archive
    fn install_archive(archive_file: &Path, local_dir: &Path) -> Result<usize> {
        let parent = local_dir
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let fresh = parent.join(format!(".siteward-mirror-{}", uuid::Uuid::new_v4().simple()));
        let unpacked = match archive::unpack_tar_gz(archive_file, &fresh, 0) {
            Ok(count) => count,
            Err(err) => {
                let _ = fs::remove_dir_all(&fresh);
                return Err(err);
            }
        };

        let unpacked = unpacked - Self::drop_artifacts(&fresh)?;

        if local_dir.exists() {
            fs::remove_dir_all(local_dir)?;
        }
        fs::rename(&fresh, local_dir)?;
        Ok(unpacked)
    }

    /// Remove our own scripts and archives picked up by a pack of the web root
    fn drop_artifacts(dir: &Path) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_name().to_string_lossy().starts_with(ARTIFACT_PREFIX) {
                continue;
            }
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(entry.path())?;
            } else {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl Access for FtpAccess {
    fn kind(&self) -> AccessKind {
        AccessKind::Ftp
    }

    fn capabilities(&self) -> Capabilities {
        CAPABILITIES
    }

    fn connect(&mut self) -> Result<Handshake> {
        if let Some(auth) = self.auth {
            return Ok(Handshake {
                auth,
                capabilities: CAPABILITIES,
            });
        }

        self.transfer.check().map_err(|err| match err {
            Error::ConnectionError { .. } => err,
            other => Error::ConnectionError {
                host: self.host.clone(),
                message: other.to_string(),
            },
        })?;

        let auth = if self.anonymous {
            AuthMethod::Anonymous
        } else {
            AuthMethod::Password
        };
        info!("Connected to {} using {} auth", self.host, auth);
        self.auth = Some(auth);
        Ok(Handshake {
            auth,
            capabilities: CAPABILITIES,
        })
    }

    fn file_exists(&self, path: &str) -> Result<bool> {
        self.transfer.exists(path)
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let local = self.staging_file("read")?;
        self.transfer.get(path, &local)?;
        let data = fs::read(&local)?;
        let _ = fs::remove_file(&local);
        Ok(data)
    }

    fn modification_time(&self, path: &str) -> Result<DateTime<Utc>> {
        self.transfer.modified(path)
    }

    fn upload_file(&self, local: &Path, remote: &str) -> Result<()> {
        self.transfer.put(local, remote)
    }

    fn download_file(&self, remote: &str, local: &Path) -> Result<PathBuf> {
        self.transfer.get(remote, local)?;
        Ok(local.to_path_buf())
    }

    fn delete_file(&self, path: &str) -> Result<()> {
        self.transfer.delete(path)
    }

    fn move_file(&self, src: &str, dst: &str) -> Result<()> {
        self.transfer.rename(src, dst)
    }

    /// The interpreter is whatever the web server runs for the script's extension
    fn run_script(&self, interpreter: &str, script: &Path, args: &[String]) -> Result<CommandOutput> {
        let gateway = self.gateway()?;
        let extension = script
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_else(|| "php".to_string());
        debug!("Running {} through the web server (interpreter {} ignored)", script.display(), interpreter);

        let remote = self.web_script_name(&extension);
        self.transfer.put(script, &remote)?;
        let result = gateway.execute(&remote, args);
        self.remove_remote(&remote);
        result
    }

    fn mirror_directory(&self, remote_dir: &str, local_dir: &Path) -> Result<()> {
        let mirror_failure =
            |code: i32, message: String| Error::from(MirrorError::single(remote_dir, code, message));

        let pack_script = self.staging_file("pack.php")?;
        fs::write(&pack_script, PACK_SCRIPT)?;

        let archive_base = self.web_script_name("tar");
        let args = [
            relative_remote(&self.web_root, remote_dir),
            relative_remote(&self.web_root, &archive_base),
        ];
        let output = self.run_script("php", &pack_script, &args);
        let _ = fs::remove_file(&pack_script);
        let output = output?;
        if !output.success() {
            return Err(mirror_failure(output.exit_code, output.stderr_lossy().trim().to_string()));
        }

        let remote_archive = format!("{archive_base}.gz");
        let local_archive = self.staging_file("mirror.tar.gz")?;
        let fetched = self.transfer.get(&remote_archive, &local_archive);
        self.remove_remote(&remote_archive);
        if let Err(err) = fetched {
            let _ = fs::remove_file(&local_archive);
            return Err(mirror_failure(-1, err.to_string()));
        }

        let installed = Self::install_archive(&local_archive, local_dir);
        let _ = fs::remove_file(&local_archive);
        let files = installed.map_err(|e| mirror_failure(-1, e.to_string()))?;

        info!("Mirrored {} files from {}:{}", files, self.host, remote_dir);
        Ok(())
    }
}

/// `path` as seen from the directory `base`, both in the FTP namespace
fn relative_remote(base: &str, path: &str) -> String {
    let components = |p: &str| -> Vec<String> {
        p.split('/')
            .filter(|c| !c.is_empty() && *c != ".")
            .map(str::to_string)
            .collect()
    };
    let base = components(base);
    let path = components(path);
    let shared = base.iter().zip(&path).take_while(|(a, b)| a == b).count();

    let mut parts: Vec<&str> = vec![".."; base.len() - shared];
    parts.extend(path[shared..].iter().map(String::as_str));
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}
