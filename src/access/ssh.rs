// src/access/ssh.rs

//! Shell-capable remote backend over the `ssh` and `rsync` programs
//!
//! Every remote command line is assembled from individually quoted
//! arguments (see [`remote_command_line`]). File contents travel through
//! `cat` on ssh stdin and stdout, so no remote path is ever parsed by a
//! second file-transfer protocol.

use super::command::{
    CommandOutput, CommandSpec, ProcessRunner, SystemRunner, remote_command_line, shell_quote,
};
use super::{Access, AccessContext, AuthMethod, Capabilities, Handshake, ShellAccess, remote_parent};
use crate::config::TransportConfig;
use crate::db::models::{AccessKind, Credentials, Instance};
use crate::error::{Error, MirrorError, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const CAPABILITIES: Capabilities = Capabilities {
    shell: true,
    transfer_only: false,
    delta_mirror: true,
};

/// Exit status ssh reserves for its own failures
const SSH_FAILURE: i32 = 255;

/// Backend for hosts reachable over ssh
pub struct SshAccess {
    destination: String,
    port: u16,
    secret: Option<String>,
    temp_dir: String,
    programs: TransportConfig,
    runner: Arc<dyn ProcessRunner>,
    auth: Option<AuthMethod>,
}

/// Registry factory
pub fn open(instance: &Instance, context: &AccessContext) -> Result<Box<dyn Access>> {
    for program in [&context.transport.ssh, &context.transport.rsync] {
        which::which(program).map_err(|e| Error::ConnectionError {
            host: instance.credentials.host.clone().unwrap_or_default(),
            message: format!("{program} not available: {e}"),
        })?;
    }

    let mut access = SshAccess::new(
        &instance.credentials,
        context.transport.clone(),
        context.runner.clone(),
    )?;
    if let Some(temp_dir) = &instance.temp_dir {
        access.temp_dir = temp_dir.clone();
    }
    Ok(Box::new(access))
}

impl SshAccess {
    pub fn new(
        credentials: &Credentials,
        programs: TransportConfig,
        runner: Arc<dyn ProcessRunner>,
    ) -> Result<Self> {
        let destination = credentials
            .destination()
            .ok_or_else(|| Error::ConfigError("ssh access requires a host".to_string()))?;
        Ok(Self {
            destination,
            port: credentials.port.unwrap_or(22),
            secret: credentials.secret.clone(),
            temp_dir: "/tmp".to_string(),
            programs,
            runner,
            auth: None,
        })
    }

    /// Same backend driving the real programs
    pub fn system(credentials: &Credentials, programs: TransportConfig) -> Result<Self> {
        Self::new(credentials, programs, Arc::new(SystemRunner))
    }

    fn connection_error(&self, message: impl Into<String>) -> Error {
        Error::ConnectionError {
            host: self.destination.clone(),
            message: message.into(),
        }
    }

    fn auth(&self) -> Result<AuthMethod> {
        self.auth
            .ok_or_else(|| self.connection_error("not connected"))
    }

    /// Options for ssh itself, including the ones rsync passes through `-e`
    fn ssh_options(&self, auth: AuthMethod) -> Vec<String> {
        let mut options = vec!["-p".to_string(), self.port.to_string()];
        match auth {
            AuthMethod::Password => options.extend([
                "-o".to_string(),
                "PubkeyAuthentication=no".to_string(),
                "-o".to_string(),
                "PreferredAuthentications=password,keyboard-interactive".to_string(),
            ]),
            _ => options.extend(["-o".to_string(), "BatchMode=yes".to_string()]),
        }
        options
    }

    /// Wrap a program for the given auth method; passwords go through `sshpass -e`
    fn authenticated(&self, program: &str, args: Vec<String>, auth: AuthMethod) -> CommandSpec {
        match (auth, &self.secret) {
            (AuthMethod::Password, Some(secret)) => CommandSpec::new(&self.programs.sshpass)
                .arg("-e")
                .arg(program)
                .args(args)
                .env("SSHPASS", secret.clone()),
            _ => CommandSpec::new(program).args(args),
        }
    }

    fn ssh_spec(&self, remote_line: String, auth: AuthMethod) -> CommandSpec {
        let mut args = self.ssh_options(auth);
        args.push(self.destination.clone());
        args.push(remote_line);
        self.authenticated(&self.programs.ssh, args, auth)
    }

    /// Run a remote command line; ssh's own failures become connection errors
    fn remote(&self, remote_line: String, stdin: Option<Vec<u8>>) -> Result<CommandOutput> {
        let auth = self.auth()?;
        let mut spec = self.ssh_spec(remote_line, auth);
        if let Some(data) = stdin {
            spec = spec.stdin(data);
        }
        let output = self.runner.run(&spec)?;
        if output.exit_code == SSH_FAILURE {
            return Err(self.connection_error(output.stderr_lossy().trim().to_string()));
        }
        Ok(output)
    }

    fn remote_checked(&self, operation: &'static str, path: &str, remote_line: String, stdin: Option<Vec<u8>>) -> Result<CommandOutput> {
        let output = self.remote(remote_line, stdin)?;
        if output.success() {
            Ok(output)
        } else {
            let message = output.stderr_lossy().trim().to_string();
            if message.contains("No such file") {
                Err(Error::NotFound(path.to_string()))
            } else {
                Err(Error::TransferError {
                    operation,
                    path: path.to_string(),
                    message,
                })
            }
        }
    }

    fn probe(&self, auth: AuthMethod) -> Result<CommandOutput> {
        self.runner.run(&self.ssh_spec("true".to_string(), auth))
    }

    fn mkdir_prefix(path: &str) -> String {
        match remote_parent(path) {
            Some(parent) => format!("mkdir -p {} && ", shell_quote(parent)),
            None => String::new(),
        }
    }

    fn staged_script_path(&self, script: &Path) -> String {
        let name = script
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "script".to_string());
        super::remote_join(
            &self.temp_dir,
            &format!("siteward-{}-{}", uuid::Uuid::new_v4().simple(), name),
        )
    }
}

impl Access for SshAccess {
    fn kind(&self) -> AccessKind {
        AccessKind::Ssh
    }

    fn capabilities(&self) -> Capabilities {
        CAPABILITIES
    }

    fn connect(&mut self) -> Result<Handshake> {
        if let Some(auth) = self.auth {
            debug!("Reusing {} auth for {}", auth, self.destination);
            return Ok(Handshake {
                auth,
                capabilities: CAPABILITIES,
            });
        }

        let key_probe = self.probe(AuthMethod::PublicKey)?;
        let auth = if key_probe.success() {
            AuthMethod::PublicKey
        } else if self.secret.is_some() {
            debug!(
                "Key auth to {} failed ({}), trying password",
                self.destination,
                key_probe.stderr_lossy().trim()
            );
            let password_probe = self.probe(AuthMethod::Password)?;
            if !password_probe.success() {
                return Err(self.connection_error(password_probe.stderr_lossy().trim().to_string()));
            }
            AuthMethod::Password
        } else {
            return Err(self.connection_error(key_probe.stderr_lossy().trim().to_string()));
        };

        info!("Connected to {} using {} auth", self.destination, auth);
        self.auth = Some(auth);
        Ok(Handshake {
            auth,
            capabilities: CAPABILITIES,
        })
    }

    fn file_exists(&self, path: &str) -> Result<bool> {
        let output = self.remote(format!("test -e {}", shell_quote(path)), None)?;
        match output.exit_code {
            0 => Ok(true),
            1 => Ok(false),
            code => Err(Error::CommandFailed {
                program: "test".to_string(),
                code,
                stderr: output.stderr_lossy().trim().to_string(),
            }),
        }
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let output = self.remote_checked("read", path, format!("cat {}", shell_quote(path)), None)?;
        Ok(output.stdout)
    }

    fn modification_time(&self, path: &str) -> Result<DateTime<Utc>> {
        let quoted = shell_quote(path);
        // GNU stat first, BSD stat as fallback
        let line = format!("stat -c %Y {quoted} 2>/dev/null || stat -f %m {quoted}");
        let output = self.remote_checked("stat", path, line, None)?;
        let text = output.stdout_lossy();
        let seconds: i64 = text
            .trim()
            .parse()
            .map_err(|_| Error::ParseError(format!("modification time of {path}: {text:?}")))?;
        DateTime::from_timestamp(seconds, 0)
            .ok_or_else(|| Error::ParseError(format!("modification time of {path}: {seconds}")))
    }

    fn upload_file(&self, local: &Path, remote: &str) -> Result<()> {
        let data = fs::read(local).map_err(|e| Error::TransferError {
            operation: "upload",
            path: local.display().to_string(),
            message: e.to_string(),
        })?;
        let line = format!("{}cat > {}", Self::mkdir_prefix(remote), shell_quote(remote));
        self.remote_checked("upload", remote, line, Some(data))?;
        Ok(())
    }

    fn download_file(&self, remote: &str, local: &Path) -> Result<PathBuf> {
        let data = self.read_file(remote)?;
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(local, data).map_err(|e| Error::TransferError {
            operation: "download",
            path: local.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(local.to_path_buf())
    }

    fn delete_file(&self, path: &str) -> Result<()> {
        if !self.file_exists(path)? {
            return Err(Error::NotFound(path.to_string()));
        }
        self.remote_checked("delete", path, format!("rm -f {}", shell_quote(path)), None)?;
        Ok(())
    }

    fn move_file(&self, src: &str, dst: &str) -> Result<()> {
        let line = format!(
            "{}mv {} {}",
            Self::mkdir_prefix(dst),
            shell_quote(src),
            shell_quote(dst)
        );
        self.remote_checked("move", src, line, None)?;
        Ok(())
    }

    fn run_script(&self, interpreter: &str, script: &Path, args: &[String]) -> Result<CommandOutput> {
        let staged = self.staged_script_path(script);
        self.upload_file(script, &staged)?;

        let spec = CommandSpec::new(interpreter)
            .arg(staged.clone())
            .args(args.iter().cloned());
        let result = self.remote(remote_command_line(&spec), None);

        if let Err(err) = self.remote(format!("rm -f {}", shell_quote(&staged)), None) {
            warn!("Failed to remove staged script {}: {}", staged, err);
        }
        result
    }

    fn mirror_directory(&self, remote_dir: &str, local_dir: &Path) -> Result<()> {
        let auth = self.auth()?;
        fs::create_dir_all(local_dir)?;

        let mut shell = vec![self.programs.ssh.clone()];
        shell.extend(self.ssh_options(auth));
        let shell = shell.iter().map(|a| shell_quote(a)).collect::<Vec<_>>().join(" ");

        let args = vec![
            "-a".to_string(),
            "--delete".to_string(),
            // Remote path is not split by the remote shell
            "--protect-args".to_string(),
            "-e".to_string(),
            shell,
            format!("{}:{}/", self.destination, remote_dir.trim_end_matches('/')),
            format!("{}/", local_dir.display()),
        ];
        let spec = self.authenticated(&self.programs.rsync, args, auth);

        let output = self.runner.run(&spec)?;
        if !output.success() {
            return Err(MirrorError::single(
                remote_dir,
                output.exit_code,
                output.stderr_lossy().trim().to_string(),
            )
            .into());
        }
        Ok(())
    }

    fn as_shell(&self) -> Option<&dyn ShellAccess> {
        Some(self)
    }
}

impl ShellAccess for SshAccess {
    fn shell_exec(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.remote(remote_command_line(spec), spec.stdin.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Responder = Box<dyn Fn(&CommandSpec) -> CommandOutput + Send + Sync>;

    /// Records every command and answers with a scripted response
    struct FakeRunner {
        calls: Mutex<Vec<CommandSpec>>,
        respond: Mutex<Responder>,
    }

    impl FakeRunner {
        fn new(respond: impl Fn(&CommandSpec) -> CommandOutput + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                respond: Mutex::new(Box::new(respond)),
            })
        }

        fn set(&self, respond: impl Fn(&CommandSpec) -> CommandOutput + Send + Sync + 'static) {
            *self.respond.lock().unwrap() = Box::new(respond);
        }

        fn calls(&self) -> Vec<CommandSpec> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ProcessRunner for FakeRunner {
        fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
            self.calls.lock().unwrap().push(spec.clone());
            let respond = self.respond.lock().unwrap();
            Ok((*respond)(spec))
        }
    }

    fn exit(code: i32) -> CommandOutput {
        CommandOutput {
            exit_code: code,
            ..CommandOutput::default()
        }
    }

    fn credentials(secret: Option<&str>) -> Credentials {
        Credentials {
            host: Some("web1.example.org".to_string()),
            port: Some(2222),
            user: Some("deploy".to_string()),
            secret: secret.map(str::to_string),
        }
    }

    fn access(runner: Arc<FakeRunner>, secret: Option<&str>) -> SshAccess {
        SshAccess::new(&credentials(secret), TransportConfig::default(), runner).unwrap()
    }

    #[test]
    fn test_connect_prefers_key_auth() {
        let runner = FakeRunner::new(|_| exit(0));
        let mut ssh = access(runner.clone(), Some("pw"));

        let handshake = ssh.connect().unwrap();
        assert_eq!(handshake.auth, AuthMethod::PublicKey);

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "ssh");
        assert_eq!(
            calls[0].args,
            vec!["-p", "2222", "-o", "BatchMode=yes", "deploy@web1.example.org", "true"]
        );
    }

    #[test]
    fn test_connect_never_downgrades() {
        let runner = FakeRunner::new(|_| exit(0));
        let mut ssh = access(runner.clone(), Some("pw"));
        assert_eq!(ssh.connect().unwrap().auth, AuthMethod::PublicKey);

        // Key auth would now fail; the proven method is kept
        runner.set(|spec| if spec.program == "ssh" { exit(255) } else { exit(0) });
        assert_eq!(ssh.connect().unwrap().auth, AuthMethod::PublicKey);
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn test_connect_falls_back_to_password() {
        let runner = FakeRunner::new(|spec| if spec.program == "sshpass" { exit(0) } else { exit(255) });
        let mut ssh = access(runner.clone(), Some("s3cret"));

        assert_eq!(ssh.connect().unwrap().auth, AuthMethod::Password);

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].program, "sshpass");
        assert_eq!(calls[1].args[0], "-e");
        assert_eq!(calls[1].args[1], "ssh");
        assert_eq!(calls[1].env, vec![("SSHPASS".to_string(), "s3cret".to_string())]);
        // The secret never appears on a command line
        assert!(calls.iter().all(|c| !c.args.iter().any(|a| a.contains("s3cret"))));
    }

    #[test]
    fn test_connect_failure_is_connection_error() {
        let runner = FakeRunner::new(|_| CommandOutput {
            stderr: b"Permission denied (publickey).\n".to_vec(),
            exit_code: 255,
            ..CommandOutput::default()
        });
        let mut ssh = access(runner, None);

        match ssh.connect() {
            Err(Error::ConnectionError { host, message }) => {
                assert_eq!(host, "deploy@web1.example.org");
                assert_eq!(message, "Permission denied (publickey).");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_operations_require_connect() {
        let ssh = access(FakeRunner::new(|_| exit(0)), None);
        assert!(matches!(ssh.file_exists("/x"), Err(Error::ConnectionError { .. })));
    }

    #[test]
    fn test_file_exists_exit_codes() {
        let runner = FakeRunner::new(|_| exit(0));
        let mut ssh = access(runner.clone(), None);
        ssh.connect().unwrap();

        assert!(ssh.file_exists("/var/www/index.php").unwrap());
        runner.set(|_| exit(1));
        assert!(!ssh.file_exists("/var/www/missing").unwrap());

        let last = runner.calls().pop().unwrap();
        assert_eq!(last.args.last().unwrap(), "test -e /var/www/missing");
    }

    #[test]
    fn test_upload_streams_through_cat() {
        let runner = FakeRunner::new(|_| exit(0));
        let mut ssh = access(runner.clone(), None);
        ssh.connect().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("page.html");
        fs::write(&local, "<p>hi</p>").unwrap();

        ssh.upload_file(&local, "/var/www/my site/page.html").unwrap();

        let call = runner.calls().pop().unwrap();
        assert_eq!(
            call.args.last().unwrap(),
            "mkdir -p '/var/www/my site' && cat > '/var/www/my site/page.html'"
        );
        assert_eq!(call.stdin.as_deref(), Some(&b"<p>hi</p>"[..]));
    }

    #[test]
    fn test_hostile_names_are_quoted() {
        let runner = FakeRunner::new(|_| exit(0));
        let mut ssh = access(runner.clone(), None);
        ssh.connect().unwrap();

        ssh.move_file("/var/www/a'; rm -rf /", "/var/www/b").unwrap();

        let call = runner.calls().pop().unwrap();
        assert_eq!(
            call.args.last().unwrap(),
            r"mkdir -p /var/www && mv '/var/www/a'\''; rm -rf /' /var/www/b"
        );
    }

    #[test]
    fn test_mirror_uses_rsync_delete() {
        let runner = FakeRunner::new(|_| exit(0));
        let mut ssh = access(runner.clone(), None);
        ssh.connect().unwrap();

        let dir = tempfile::tempdir().unwrap();
        ssh.mirror_directory("/var/www/site/", dir.path()).unwrap();

        let call = runner.calls().pop().unwrap();
        assert_eq!(call.program, "rsync");
        assert!(call.args.contains(&"--delete".to_string()));
        assert!(call.args.contains(&"ssh -p 2222 -o BatchMode=yes".to_string()));
        assert_eq!(call.args[call.args.len() - 2], "deploy@web1.example.org:/var/www/site/");
    }

    #[test]
    fn test_mirror_failure_keeps_native_code() {
        let runner = FakeRunner::new(|_| exit(0));
        let mut ssh = access(runner.clone(), None);
        ssh.connect().unwrap();
        runner.set(|_| CommandOutput {
            stderr: b"rsync: change_dir failed\n".to_vec(),
            exit_code: 23,
            ..CommandOutput::default()
        });

        let dir = tempfile::tempdir().unwrap();
        match ssh.mirror_directory("/var/www/files", dir.path()) {
            Err(Error::MirrorError(err)) => {
                assert_eq!(err.failures[0].path, "/var/www/files");
                assert_eq!(err.failures[0].code, 23);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_run_script_cleans_up() {
        let runner = FakeRunner::new(|_| exit(0));
        let mut ssh = access(runner.clone(), None);
        ssh.connect().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("migrate.php");
        fs::write(&script, "<?php echo 1;").unwrap();

        let output = ssh.run_script("php", &script, &["--force".to_string()]).unwrap();
        assert!(output.success());

        let lines: Vec<String> = runner
            .calls()
            .iter()
            .skip(1)
            .map(|c| c.args.last().unwrap().clone())
            .collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("cat > /tmp/siteward-"));
        assert!(lines[1].starts_with("php /tmp/siteward-"));
        assert!(lines[1].ends_with("migrate.php --force"));
        assert!(lines[2].starts_with("rm -f /tmp/siteward-"));
    }
}
