// src/access/transfer.rs

//! File-transfer clients used by the ftp backend
//!
//! [`CurlTransfer`] talks FTP by driving `curl`. Credentials are handed to
//! curl as a config file on stdin, never on its command line.
//! [`DirectoryTransfer`] serves a transfer root that is mounted locally.

use super::command::{CommandOutput, CommandSpec, ProcessRunner};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// The operations a file-transfer-only host offers
pub trait FileTransfer {
    /// Prove the login works
    fn check(&self) -> Result<()>;
    fn exists(&self, path: &str) -> Result<bool>;
    fn modified(&self, path: &str) -> Result<DateTime<Utc>>;
    fn get(&self, remote: &str, local: &Path) -> Result<()>;
    /// Upload, creating missing remote directories
    fn put(&self, local: &Path, remote: &str) -> Result<()>;
    fn delete(&self, path: &str) -> Result<()>;
    fn rename(&self, from: &str, to: &str) -> Result<()>;
}

// curl exit codes that mean "the remote file is not there"
const CURL_ACCESS_DENIED: i32 = 9;
const CURL_RETR_FAILED: i32 = 19;
const CURL_QUOTE_ERROR: i32 = 21;
const CURL_LOGIN_DENIED: i32 = 67;
const CURL_REMOTE_NOT_FOUND: i32 = 78;

/// FTP through the `curl` program
pub struct CurlTransfer {
    curl: String,
    host: String,
    base: Url,
    user: Option<String>,
    secret: Option<String>,
    runner: Arc<dyn ProcessRunner>,
}

impl CurlTransfer {
    pub fn new(
        curl: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        user: Option<String>,
        secret: Option<String>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Result<Self> {
        let host = host.into();
        let mut base = Url::parse("ftp://localhost/")
            .map_err(|e| Error::ConfigError(format!("ftp URL: {e}")))?;
        base.set_host(Some(&host))
            .map_err(|e| Error::ConfigError(format!("invalid ftp host {host}: {e}")))?;
        base.set_port(Some(port))
            .map_err(|()| Error::ConfigError(format!("invalid ftp port {port}")))?;

        Ok(Self {
            curl: curl.into(),
            host,
            base,
            user,
            secret,
            runner,
        })
    }

    /// `ftp://` URL for a path; absolute paths keep their leading `/` as `%2F`
    pub fn url(&self, path: &str) -> String {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.clear();
            let mut parts = path.split('/').filter(|s| !s.is_empty());
            match parts.next() {
                Some(first) if path.starts_with('/') => {
                    segments.push(&format!("/{first}"));
                }
                Some(first) => {
                    segments.push(first);
                }
                None if path.starts_with('/') => {
                    segments.push("/");
                }
                None => {}
            }
            segments.extend(parts);
            if path.ends_with('/') && path.len() > 1 {
                segments.push("");
            }
        }
        url.into()
    }

    fn credentials_config(&self) -> Vec<u8> {
        match &self.user {
            Some(user) => {
                let pair = format!("{}:{}", user, self.secret.as_deref().unwrap_or(""));
                format!("user = \"{}\"\n", escape_config(&pair)).into_bytes()
            }
            None => Vec::new(),
        }
    }

    fn run(&self, args: Vec<String>) -> Result<CommandOutput> {
        let spec = CommandSpec::new(&self.curl)
            .args(["--config", "-", "--silent", "--show-error"])
            .args(args)
            .stdin(self.credentials_config());
        self.runner.run(&spec)
    }

    fn failure(&self, operation: &'static str, path: &str, output: &CommandOutput) -> Error {
        match output.exit_code {
            CURL_LOGIN_DENIED => Error::ConnectionError {
                host: self.host.clone(),
                message: output.stderr_lossy().trim().to_string(),
            },
            CURL_ACCESS_DENIED | CURL_RETR_FAILED | CURL_REMOTE_NOT_FOUND => {
                Error::NotFound(path.to_string())
            }
            code => Error::TransferError {
                operation,
                path: path.to_string(),
                message: format!("curl exit {}: {}", code, output.stderr_lossy().trim()),
            },
        }
    }

    fn head(&self, path: &str) -> Result<CommandOutput> {
        self.run(vec!["--head".to_string(), self.url(path)])
    }

    /// Send raw FTP commands after logging in at the server root
    fn quote(&self, operation: &'static str, path: &str, commands: &[String]) -> Result<()> {
        let mut args = Vec::new();
        for command in commands {
            args.push("--quote".to_string());
            args.push(command.clone());
        }
        args.push("--list-only".to_string());
        args.push(self.url("/"));

        let output = self.run(args)?;
        match output.exit_code {
            0 => Ok(()),
            CURL_QUOTE_ERROR => Err(Error::TransferError {
                operation,
                path: path.to_string(),
                message: output.stderr_lossy().trim().to_string(),
            }),
            _ => Err(self.failure(operation, path, &output)),
        }
    }
}

fn escape_config(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Parse the `Last-Modified:` header curl prints for `--head` on FTP
fn parse_last_modified(headers: &str) -> Option<DateTime<Utc>> {
    headers.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if !name.trim().eq_ignore_ascii_case("last-modified") {
            return None;
        }
        DateTime::parse_from_rfc2822(value.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc))
    })
}

impl FileTransfer for CurlTransfer {
    fn check(&self) -> Result<()> {
        let output = self.run(vec!["--list-only".to_string(), self.url("/")])?;
        if output.success() {
            Ok(())
        } else {
            Err(Error::ConnectionError {
                host: self.host.clone(),
                message: format!("curl exit {}: {}", output.exit_code, output.stderr_lossy().trim()),
            })
        }
    }

    fn exists(&self, path: &str) -> Result<bool> {
        let output = self.head(path)?;
        match output.exit_code {
            0 => Ok(true),
            CURL_ACCESS_DENIED | CURL_RETR_FAILED | CURL_REMOTE_NOT_FOUND => Ok(false),
            _ => Err(self.failure("stat", path, &output)),
        }
    }

    fn modified(&self, path: &str) -> Result<DateTime<Utc>> {
        let output = self.head(path)?;
        if !output.success() {
            return Err(self.failure("stat", path, &output));
        }
        parse_last_modified(&output.stdout_lossy())
            .ok_or_else(|| Error::ParseError(format!("no modification time for {path}")))
    }

    fn get(&self, remote: &str, local: &Path) -> Result<()> {
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent)?;
        }
        let output = self.run(vec![
            "--output".to_string(),
            local.to_string_lossy().to_string(),
            self.url(remote),
        ])?;
        if output.success() {
            Ok(())
        } else {
            // curl leaves an empty file behind on failure
            let _ = fs::remove_file(local);
            Err(self.failure("download", remote, &output))
        }
    }

    fn put(&self, local: &Path, remote: &str) -> Result<()> {
        let output = self.run(vec![
            "--ftp-create-dirs".to_string(),
            "--upload-file".to_string(),
            local.to_string_lossy().to_string(),
            self.url(remote),
        ])?;
        if output.success() {
            Ok(())
        } else {
            Err(self.failure("upload", remote, &output))
        }
    }

    fn delete(&self, path: &str) -> Result<()> {
        if !self.exists(path)? {
            return Err(Error::NotFound(path.to_string()));
        }
        self.quote("delete", path, &[format!("DELE {path}")])
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.quote("move", from, &[format!("RNFR {from}"), format!("RNTO {to}")])
    }
}

/// Transfer root mounted on this machine
///
/// Remote path `/a/b` maps to `<root>/a/b`. Paths that climb out of the
/// root are rejected.
#[derive(Debug, Clone)]
pub struct DirectoryTransfer {
    root: PathBuf,
}

impl DirectoryTransfer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn resolve(&self, remote: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for component in Path::new(remote.trim_start_matches('/')).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => return Err(Error::InvalidPath(remote.to_string())),
            }
        }
        Ok(path)
    }
}

fn io_failure(operation: &'static str, path: &str, err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::NotFound {
        Error::NotFound(path.to_string())
    } else {
        Error::TransferError {
            operation,
            path: path.to_string(),
            message: err.to_string(),
        }
    }
}

impl FileTransfer for DirectoryTransfer {
    fn check(&self) -> Result<()> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(Error::ConnectionError {
                host: self.root.display().to_string(),
                message: "transfer root is not a directory".to_string(),
            })
        }
    }

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.resolve(path)?.exists())
    }

    fn modified(&self, path: &str) -> Result<DateTime<Utc>> {
        let modified = fs::metadata(self.resolve(path)?)
            .and_then(|m| m.modified())
            .map_err(|e| io_failure("stat", path, e))?;
        Ok(DateTime::<Utc>::from(modified))
    }

    fn get(&self, remote: &str, local: &Path) -> Result<()> {
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(self.resolve(remote)?, local).map_err(|e| io_failure("download", remote, e))?;
        Ok(())
    }

    fn put(&self, local: &Path, remote: &str) -> Result<()> {
        let target = self.resolve(remote)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| io_failure("upload", remote, e))?;
        }
        debug!("Storing {} at {}", local.display(), target.display());
        fs::copy(local, &target).map_err(|e| io_failure("upload", remote, e))?;
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<()> {
        fs::remove_file(self.resolve(path)?).map_err(|e| io_failure("delete", path, e))
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let target = self.resolve(to)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| io_failure("move", to, e))?;
        }
        fs::rename(self.resolve(from)?, target).map_err(|e| io_failure("move", from, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        calls: Mutex<Vec<CommandSpec>>,
        exit_code: i32,
        stdout: &'static str,
    }

    impl ProcessRunner for Recorder {
        fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
            self.calls.lock().unwrap().push(spec.clone());
            Ok(CommandOutput {
                stdout: self.stdout.as_bytes().to_vec(),
                stderr: Vec::new(),
                exit_code: self.exit_code,
            })
        }
    }

    fn curl(exit_code: i32, stdout: &'static str) -> (Arc<Recorder>, CurlTransfer) {
        let recorder = Arc::new(Recorder {
            calls: Mutex::new(Vec::new()),
            exit_code,
            stdout,
        });
        let transfer = CurlTransfer::new(
            "curl",
            "ftp.example.org",
            21,
            Some("deploy".to_string()),
            Some("pa\"ss".to_string()),
            recorder.clone(),
        )
        .unwrap();
        (recorder, transfer)
    }

    #[test]
    fn test_url_encoding() {
        let (_, transfer) = curl(0, "");
        assert_eq!(
            transfer.url("/var/www/my site/index.php"),
            "ftp://ftp.example.org/%2Fvar/www/my%20site/index.php"
        );
        assert_eq!(transfer.url("htdocs/a#b"), "ftp://ftp.example.org/htdocs/a%23b");
        assert_eq!(transfer.url("htdocs/100%"), "ftp://ftp.example.org/htdocs/100%25");
        assert_eq!(transfer.url("/www/files/"), "ftp://ftp.example.org/%2Fwww/files/");
        assert_eq!(transfer.url("/"), "ftp://ftp.example.org/%2F");
    }

    #[test]
    fn test_url_keeps_custom_port() {
        let transfer = CurlTransfer::new(
            "curl",
            "ftp.example.org",
            2121,
            None,
            None,
            Arc::new(Recorder {
                calls: Mutex::new(Vec::new()),
                exit_code: 0,
                stdout: "",
            }),
        )
        .unwrap();
        assert_eq!(transfer.url("a.html"), "ftp://ftp.example.org:2121/a.html");
    }

    #[test]
    fn test_rejects_invalid_host() {
        let result = CurlTransfer::new(
            "curl",
            "bad host",
            21,
            None,
            None,
            Arc::new(Recorder {
                calls: Mutex::new(Vec::new()),
                exit_code: 0,
                stdout: "",
            }),
        );
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_credentials_go_through_stdin() {
        let (recorder, transfer) = curl(0, "");
        transfer.check().unwrap();

        let call = recorder.calls.lock().unwrap()[0].clone();
        assert_eq!(&call.args[..2], &["--config".to_string(), "-".to_string()]);
        assert_eq!(call.stdin.as_deref(), Some(&b"user = \"deploy:pa\\\"ss\"\n"[..]));
        assert!(!call.args.iter().any(|a| a.contains("deploy")));
    }

    #[test]
    fn test_exists_maps_not_found() {
        let (_, transfer) = curl(CURL_REMOTE_NOT_FOUND, "");
        assert!(!transfer.exists("/var/www/missing").unwrap());

        let (_, transfer) = curl(CURL_LOGIN_DENIED, "");
        assert!(matches!(transfer.exists("/x"), Err(Error::ConnectionError { .. })));
    }

    #[test]
    fn test_modified_from_head() {
        let (_, transfer) = curl(0, "Last-Modified: Tue, 15 Nov 1994 12:45:26 GMT\r\nContent-Length: 10\r\n");
        let time = transfer.modified("/index.php").unwrap();
        assert_eq!(time.timestamp(), 784903526);
    }

    #[test]
    fn test_rename_uses_quote_commands() {
        let (recorder, transfer) = curl(0, "");
        transfer.rename("/www/index.php", "/www/index.php.maintenance").unwrap();

        let call = recorder.calls.lock().unwrap()[0].clone();
        let quotes: Vec<&String> = call
            .args
            .windows(2)
            .filter(|w| w[0] == "--quote")
            .map(|w| &w[1])
            .collect();
        assert_eq!(quotes, vec!["RNFR /www/index.php", "RNTO /www/index.php.maintenance"]);
    }

    #[test]
    fn test_directory_transfer() {
        let root = tempfile::tempdir().unwrap();
        let local = tempfile::tempdir().unwrap();
        let transfer = DirectoryTransfer::new(root.path());
        transfer.check().unwrap();

        let src = local.path().join("a.txt");
        fs::write(&src, "a").unwrap();
        transfer.put(&src, "/www/sub/a.txt").unwrap();
        assert!(root.path().join("www/sub/a.txt").exists());
        assert!(transfer.exists("/www/sub/a.txt").unwrap());

        transfer.rename("/www/sub/a.txt", "/www/b.txt").unwrap();
        transfer.get("/www/b.txt", &local.path().join("back.txt")).unwrap();
        assert_eq!(fs::read_to_string(local.path().join("back.txt")).unwrap(), "a");

        transfer.delete("/www/b.txt").unwrap();
        assert!(matches!(transfer.delete("/www/b.txt"), Err(Error::NotFound(_))));
        assert!(matches!(transfer.resolve("/www/../../etc/passwd"), Err(Error::InvalidPath(_))));
    }
}
