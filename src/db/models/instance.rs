// src/db/models/instance.rs

//! Instance model - one managed deployment and its access credentials

use super::{Version, parse_column};
use crate::error::{Error, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::fmt;
use std::str::FromStr;

/// How a host is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    /// Same machine, direct filesystem and process access
    Local,
    /// Shell-capable secure remote access
    Ssh,
    /// File-transfer-only remote access
    Ftp,
}

impl AccessKind {
    pub const ALL: [AccessKind; 3] = [AccessKind::Local, AccessKind::Ssh, AccessKind::Ftp];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessKind::Local => "local",
            AccessKind::Ssh => "ssh",
            AccessKind::Ftp => "ftp",
        }
    }

    /// Default port for remote kinds
    pub fn default_port(&self) -> Option<u16> {
        match self {
            AccessKind::Local => None,
            AccessKind::Ssh => Some(22),
            AccessKind::Ftp => Some(21),
        }
    }
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "local" => Ok(AccessKind::Local),
            "ssh" => Ok(AccessKind::Ssh),
            "ftp" => Ok(AccessKind::Ftp),
            _ => Err(format!("Invalid access kind: {s}")),
        }
    }
}

/// Which application collaborator manages the installed software
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplicationKind {
    /// Files deployed by copying a clean source tree into the web root
    Static,
    /// Software changed by hand or by its own updater; only tracked
    Unmanaged,
}

impl ApplicationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationKind::Static => "static",
            ApplicationKind::Unmanaged => "unmanaged",
        }
    }
}

impl fmt::Display for ApplicationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "static" => Ok(ApplicationKind::Static),
            "unmanaged" => Ok(ApplicationKind::Unmanaged),
            _ => Err(format!("Invalid application kind: {s}")),
        }
    }
}

/// Access credentials for an instance
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub secret: Option<String>,
}

impl Credentials {
    /// `user@host` (or just `host`) for remote programs
    pub fn destination(&self) -> Option<String> {
        let host = self.host.as_deref()?;
        Some(match self.user.as_deref() {
            Some(user) if !user.is_empty() => format!("{user}@{host}"),
            _ => host.to_string(),
        })
    }
}

// Never print the secret
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A managed deployment of the web application
#[derive(Debug, Clone)]
pub struct Instance {
    pub id: Option<i64>,
    pub name: String,
    pub web_root: String,
    pub web_url: Option<String>,
    /// Working directory on the host for staged scripts and archives
    pub temp_dir: Option<String>,
    /// Interpreter used to run maintenance scripts on the host
    pub interpreter: Option<String>,
    pub app_kind: ApplicationKind,
    pub access_kind: AccessKind,
    pub credentials: Credentials,
    pub created_at: Option<String>,
}

const SELECT_INSTANCE: &str = "SELECT i.id, i.name, i.web_root, i.web_url, i.temp_dir, i.interpreter,
        i.app_kind, i.access_kind, i.created_at, c.host, c.port, c.user, c.secret
     FROM instances i LEFT JOIN credentials c ON c.instance_id = i.id";

impl Instance {
    pub fn new(
        name: String,
        web_root: String,
        app_kind: ApplicationKind,
        access_kind: AccessKind,
    ) -> Self {
        Self {
            id: None,
            name,
            web_root,
            web_url: None,
            temp_dir: None,
            interpreter: None,
            app_kind,
            access_kind,
            credentials: Credentials::default(),
            created_at: None,
        }
    }

    /// Insert this instance and its credential set
    ///
    /// Two rows are written; call inside `db::transaction` to keep them
    /// together.
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO instances (name, web_root, web_url, temp_dir, interpreter, app_kind, access_kind)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &self.name,
                &self.web_root,
                &self.web_url,
                &self.temp_dir,
                &self.interpreter,
                self.app_kind.as_str(),
                self.access_kind.as_str(),
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);

        conn.execute(
            "INSERT INTO credentials (instance_id, host, port, user, secret) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                &self.credentials.host,
                &self.credentials.port,
                &self.credentials.user,
                &self.credentials.secret,
            ],
        )?;

        Ok(id)
    }

    /// The id, or an error for an instance that was never inserted
    pub fn require_id(&self) -> Result<i64> {
        self.id
            .ok_or_else(|| Error::NotFound(format!("instance '{}' has no id", self.name)))
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!("{SELECT_INSTANCE} WHERE i.id = ?1"))?;
        let instance = stmt.query_row([id], Self::from_row).optional()?;
        Ok(instance)
    }

    pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!("{SELECT_INSTANCE} WHERE i.name = ?1"))?;
        let instance = stmt.query_row([name], Self::from_row).optional()?;
        Ok(instance)
    }

    /// Look up by numeric id or by name
    pub fn resolve(conn: &Connection, reference: &str) -> Result<Self> {
        let found = match reference.parse::<i64>() {
            Ok(id) => Self::find_by_id(conn, id)?,
            Err(_) => Self::find_by_name(conn, reference)?,
        };
        found.ok_or_else(|| Error::NotFound(format!("instance '{}'", reference)))
    }

    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!("{SELECT_INSTANCE} ORDER BY i.name"))?;

        let instances = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(instances)
    }

    /// Replace the stored credential set
    pub fn update_credentials(&mut self, conn: &Connection, credentials: Credentials) -> Result<()> {
        let id = self.require_id()?;
        conn.execute(
            "UPDATE credentials SET host = ?1, port = ?2, user = ?3, secret = ?4 WHERE instance_id = ?5",
            params![
                &credentials.host,
                &credentials.port,
                &credentials.user,
                &credentials.secret,
                id,
            ],
        )?;
        self.credentials = credentials;
        Ok(())
    }

    /// Delete an instance; credentials, versions and checksums cascade
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM instances WHERE id = ?1", [id])?;
        Ok(())
    }

    /// The instance's current software state
    pub fn latest_version(&self, conn: &Connection) -> Result<Option<Version>> {
        Version::latest_for_instance(conn, self.require_id()?)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            web_root: row.get(2)?,
            web_url: row.get(3)?,
            temp_dir: row.get(4)?,
            interpreter: row.get(5)?,
            app_kind: parse_column(row, 6)?,
            access_kind: parse_column(row, 7)?,
            created_at: row.get(8)?,
            credentials: Credentials {
                host: row.get(9)?,
                port: row.get(10)?,
                user: row.get(11)?,
                secret: row.get(12)?,
            },
        })
    }
}
