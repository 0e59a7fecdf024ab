// src/error.rs

//! Error types for siteward
//!
//! Transport failures keep the backend's native detail (exit code, failing
//! path) so callers can report the whole failure surface. Reconciliation
//! conflicts are never errors; they are returned as data.

use std::fmt;
use thiserror::Error;

/// Result type alias for siteward operations
pub type Result<T> = std::result::Result<T, Error>;

/// A single failed sub-path of a bulk mirror
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorFailure {
    /// Remote path that failed to mirror
    pub path: String,
    /// Backend-native error code (process exit code, HTTP status, ...)
    pub code: i32,
    /// Backend-native message
    pub message: String,
}

/// Aggregated failures of one or more directory mirrors
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MirrorError {
    pub failures: Vec<MirrorFailure>,
}

impl MirrorError {
    pub fn single(path: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Self {
            failures: vec![MirrorFailure {
                path: path.into(),
                code,
                message: message.into(),
            }],
        }
    }

    /// Paths that failed, in the order they were attempted
    pub fn paths(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.path.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for MirrorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} path(s) failed to mirror", self.failures.len())?;
        for failure in &self.failures {
            write!(
                f,
                "; {} (code {}): {}",
                failure.path, failure.code, failure.message
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for MirrorError {}

/// Errors that can occur in siteward operations
#[derive(Error, Debug)]
pub enum Error {
    /// Transport handshake or authentication failed
    #[error("Connection to {host} failed: {message}")]
    ConnectionError { host: String, message: String },

    /// One or more directory mirrors failed
    #[error("Mirror failed: {0}")]
    MirrorError(#[from] MirrorError),

    /// A single file transfer operation failed
    #[error("{operation} failed for {path}: {message}")]
    TransferError {
        operation: &'static str,
        path: String,
        message: String,
    },

    /// A command returned a non-zero exit code
    #[error("Command '{program}' exited with code {code}: {stderr}")]
    CommandFailed {
        program: String,
        code: i32,
        stderr: String,
    },

    /// The application collaborator failed to mutate the installation
    #[error("Application {step} failed: {message}")]
    MutationError { step: String, message: String },

    /// The backend lacks the capability an operation needs
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Path is malformed or escapes its root
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Parse error
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// I/O error with context
    #[error("I/O error: {0}")]
    IoError(String),

    /// Raw I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl Error {
    /// Whether this error came from the transport handshake
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::ConnectionError { .. })
    }
}
