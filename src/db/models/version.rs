// src/db/models/version.rs

//! Version model - what software state an instance is or was running

use super::{ChecksumEntry, parse_column};
use crate::checksum::ChecksumMap;
use crate::error::{Error, Result};
use crate::hash::HashAlgorithm;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::fmt;
use std::str::FromStr;

/// Where the software for a version comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VcsKind {
    Git,
    Svn,
    Tarball,
    /// A plain source directory on the manager host
    Src,
}

impl VcsKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VcsKind::Git => "git",
            VcsKind::Svn => "svn",
            VcsKind::Tarball => "tarball",
            VcsKind::Src => "src",
        }
    }
}

impl fmt::Display for VcsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VcsKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "git" => Ok(VcsKind::Git),
            "svn" => Ok(VcsKind::Svn),
            "tarball" => Ok(VcsKind::Tarball),
            "src" => Ok(VcsKind::Src),
            _ => Err(format!("Invalid version control kind: {s}")),
        }
    }
}

/// The operation that produced a version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionAction {
    Create,
    Update,
    Upgrade,
    Restore,
    Clone,
}

impl VersionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionAction::Create => "create",
            VersionAction::Update => "update",
            VersionAction::Upgrade => "upgrade",
            VersionAction::Restore => "restore",
            VersionAction::Clone => "clone",
        }
    }
}

impl fmt::Display for VersionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "create" => Ok(VersionAction::Create),
            "update" => Ok(VersionAction::Update),
            "upgrade" => Ok(VersionAction::Upgrade),
            "restore" => Ok(VersionAction::Restore),
            "clone" => Ok(VersionAction::Clone),
            _ => Err(format!("Invalid version action: {s}")),
        }
    }
}

/// A point-in-time record of an instance's software
///
/// The version with the highest id is the instance's current state. Apart
/// from revision/date backfill and baseline growth, versions never change
/// once inserted.
#[derive(Debug, Clone)]
pub struct Version {
    pub id: Option<i64>,
    pub instance_id: i64,
    pub vcs: VcsKind,
    pub branch: String,
    pub revision: Option<String>,
    pub date: Option<String>,
    pub action: VersionAction,
    /// Digest used for this version's baseline
    pub hash_algorithm: HashAlgorithm,
}

const SELECT_VERSION: &str =
    "SELECT id, instance_id, vcs, branch, revision, date, action, hash_algorithm FROM versions";

impl Version {
    /// Create a new version dated today
    pub fn new(instance_id: i64, vcs: VcsKind, branch: String, action: VersionAction) -> Self {
        Self {
            id: None,
            instance_id,
            vcs,
            branch,
            revision: None,
            date: Some(chrono::Utc::now().format("%Y-%m-%d").to_string()),
            action,
            hash_algorithm: HashAlgorithm::default(),
        }
    }

    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO versions (instance_id, vcs, branch, revision, date, action, hash_algorithm)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                self.instance_id,
                self.vcs.as_str(),
                &self.branch,
                &self.revision,
                &self.date,
                self.action.as_str(),
                self.hash_algorithm.name(),
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    pub fn require_id(&self) -> Result<i64> {
        self.id
            .ok_or_else(|| Error::NotFound("version has not been inserted".to_string()))
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!("{SELECT_VERSION} WHERE id = ?1"))?;
        let version = stmt.query_row([id], Self::from_row).optional()?;
        Ok(version)
    }

    /// All versions of an instance, oldest first
    pub fn list_for_instance(conn: &Connection, instance_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "{SELECT_VERSION} WHERE instance_id = ?1 ORDER BY id"
        ))?;

        let versions = stmt
            .query_map([instance_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(versions)
    }

    /// The instance's current version (highest id)
    pub fn latest_for_instance(conn: &Connection, instance_id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "{SELECT_VERSION} WHERE instance_id = ?1 ORDER BY id DESC LIMIT 1"
        ))?;
        let version = stmt.query_row([instance_id], Self::from_row).optional()?;
        Ok(version)
    }

    /// Fill in revision and date once the mutation has reported them
    ///
    /// `None` keeps the stored value.
    pub fn backfill(
        &mut self,
        conn: &Connection,
        revision: Option<&str>,
        date: Option<&str>,
    ) -> Result<()> {
        let id = self.require_id()?;
        conn.execute(
            "UPDATE versions SET revision = COALESCE(?1, revision), date = COALESCE(?2, date) WHERE id = ?3",
            params![revision, date, id],
        )?;

        if let Some(revision) = revision {
            self.revision = Some(revision.to_string());
        }
        if let Some(date) = date {
            self.date = Some(date.to_string());
        }
        Ok(())
    }

    /// This version's baseline
    pub fn checksum_map(&self, conn: &Connection) -> Result<ChecksumMap> {
        ChecksumEntry::map_for_version(conn, self.require_id()?)
    }

    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM versions WHERE id = ?1", [id])?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let algorithm: String = row.get(7)?;
        let hash_algorithm = algorithm.parse::<HashAlgorithm>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                7,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    e.to_string(),
                )),
            )
        })?;

        Ok(Self {
            id: Some(row.get(0)?),
            instance_id: row.get(1)?,
            vcs: parse_column(row, 2)?,
            branch: row.get(3)?,
            revision: row.get(4)?,
            date: row.get(5)?,
            action: parse_column(row, 6)?,
            hash_algorithm,
        })
    }
}
