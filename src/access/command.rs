// src/access/command.rs

//! Argument-list process invocation
//!
//! Nothing here builds a local shell string. Programs are started with an
//! explicit argument vector; when a command has to travel to a remote
//! shell (ssh), every argument is single-quote escaped on its own.

use crate::error::{Error, Result};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use tracing::debug;

/// A program invocation: program, arguments, working directory, environment, stdin
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub stdin: Option<Vec<u8>>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, data: Vec<u8>) -> Self {
        self.stdin = Some(data);
        self
    }

    /// Quoted rendering for logs; environment values are not shown
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of a command: three independently inspectable values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Turn a non-zero exit into `CommandFailed`
    pub fn check(self, program: &str) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::CommandFailed {
                program: program.to_string(),
                code: self.exit_code,
                stderr: self.stderr_lossy().trim().to_string(),
            })
        }
    }
}

/// Runs local processes
///
/// The remote backends drive `ssh`, `rsync`, `sshpass` and `curl` through
/// this seam, so their command construction can be exercised without the
/// programs or a network.
pub trait ProcessRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// Runs processes on this machine with `std::process::Command`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        debug!("Running: {}", spec.display());

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &spec.env {
            command.env(key, value);
        }

        let mut child = command
            .spawn()
            .map_err(|e| Error::IoError(format!("failed to execute {}: {}", spec.program, e)))?;

        // Feed stdin from a separate thread so a chatty child cannot deadlock us
        let writer = match (child.stdin.take(), &spec.stdin) {
            (Some(mut pipe), Some(data)) => {
                let data = data.clone();
                Some(thread::spawn(move || pipe.write_all(&data)))
            }
            _ => None,
        };

        let output = child
            .wait_with_output()
            .map_err(|e| Error::IoError(format!("failed to wait for {}: {}", spec.program, e)))?;

        if let Some(writer) = writer {
            match writer.join() {
                Ok(Ok(())) => {}
                // The child may exit before reading everything; its exit code says why
                Ok(Err(e)) => debug!("stdin of {} closed early: {}", spec.program, e),
                Err(_) => {
                    return Err(Error::IoError(format!(
                        "stdin writer for {} panicked",
                        spec.program
                    )));
                }
            }
        }

        Ok(CommandOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

/// POSIX single-quote escaping of one argument
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | ':' | '=' | ',' | '+' | '@'));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Command line for a remote POSIX shell, every element quoted separately
///
/// `cwd` becomes a leading `cd`, environment goes through `env(1)`. Stdin is
/// not part of the line; the transport forwards it.
pub fn remote_command_line(spec: &CommandSpec) -> String {
    let mut parts = Vec::new();

    if !spec.env.is_empty() {
        parts.push("env".to_string());
        for (key, value) in &spec.env {
            parts.push(shell_quote(&format!("{key}={value}")));
        }
    }
    parts.push(shell_quote(&spec.program));
    parts.extend(spec.args.iter().map(|a| shell_quote(a)));

    let line = parts.join(" ");
    match &spec.cwd {
        Some(cwd) => format!("cd {} && {}", shell_quote(&cwd.to_string_lossy()), line),
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain/path.php"), "plain/path.php");
        assert_eq!(shell_quote("with space"), "'with space'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("$(rm -rf /)"), "'$(rm -rf /)'");
        assert_eq!(shell_quote("a;b"), "'a;b'");
    }

    #[test]
    fn test_remote_command_line() {
        let spec = CommandSpec::new("php")
            .arg("console.php")
            .arg("database:update")
            .arg("name with 'quote'")
            .cwd("/var/www/my site")
            .env("HOME", "/home/deploy");

        assert_eq!(
            remote_command_line(&spec),
            r"cd '/var/www/my site' && env HOME=/home/deploy php console.php database:update 'name with '\''quote'\'''"
        );
    }

    #[test]
    fn test_check_maps_exit_code() {
        let output = CommandOutput {
            stdout: Vec::new(),
            stderr: b"denied\n".to_vec(),
            exit_code: 3,
        };
        match output.check("rsync") {
            Err(Error::CommandFailed { program, code, stderr }) => {
                assert_eq!(program, "rsync");
                assert_eq!(code, 3);
                assert_eq!(stderr, "denied");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_captures_streams() {
        let spec = CommandSpec::new("sh")
            .arg("-c")
            .arg("cat; echo err >&2; exit 4")
            .stdin(b"from stdin".to_vec());

        let output = SystemRunner.run(&spec).unwrap();
        assert_eq!(output.stdout_lossy(), "from stdin");
        assert_eq!(output.stderr_lossy(), "err\n");
        assert_eq!(output.exit_code, 4);
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_cwd_and_env() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::new("sh")
            .arg("-c")
            .arg("pwd; printf %s \"$SITEWARD_TEST\"")
            .cwd(dir.path())
            .env("SITEWARD_TEST", "value");

        let output = SystemRunner.run(&spec).unwrap();
        let stdout = output.stdout_lossy();
        assert!(stdout.ends_with("value"));
        assert!(output.success());
    }

    #[test]
    fn test_missing_program() {
        let result = SystemRunner.run(&CommandSpec::new("siteward-no-such-program"));
        assert!(matches!(result, Err(Error::IoError(_))));
    }
}
