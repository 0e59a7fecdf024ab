// src/db/models/checksum.rs

//! ChecksumEntry model - one (version, path) -> hash row of a baseline

use crate::checksum::ChecksumMap;
use crate::error::Result;
use rusqlite::{Connection, Row, params};

/// A single baseline row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumEntry {
    pub id: Option<i64>,
    pub version_id: i64,
    pub path: String,
    pub hash: String,
}

impl ChecksumEntry {
    pub fn new(version_id: i64, path: String, hash: String) -> Self {
        Self {
            id: None,
            version_id,
            path,
            hash,
        }
    }

    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO checksums (version_id, path, hash) VALUES (?1, ?2, ?3)",
            params![self.version_id, &self.path, &self.hash],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Insert or replace the hash recorded for a path
    pub fn upsert(conn: &Connection, version_id: i64, path: &str, hash: &str) -> Result<()> {
        conn.execute(
            "INSERT INTO checksums (version_id, path, hash) VALUES (?1, ?2, ?3)
             ON CONFLICT(version_id, path) DO UPDATE SET hash = excluded.hash",
            params![version_id, path, hash],
        )?;
        Ok(())
    }

    /// Replace a version's whole baseline
    ///
    /// All or nothing: runs in its own transaction, or joins the caller's
    /// when one is already open on `conn`.
    pub fn replace_all(conn: &Connection, version_id: i64, map: &ChecksumMap) -> Result<usize> {
        let tx = if conn.is_autocommit() {
            Some(conn.unchecked_transaction()?)
        } else {
            None
        };

        Self::delete_for_version(conn, version_id)?;
        {
            let mut stmt =
                conn.prepare("INSERT INTO checksums (version_id, path, hash) VALUES (?1, ?2, ?3)")?;
            for (path, hash) in map {
                stmt.execute(params![version_id, path, hash])?;
            }
        }

        if let Some(tx) = tx {
            tx.commit()?;
        }
        Ok(map.len())
    }

    pub fn find_by_version(conn: &Connection, version_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, version_id, path, hash FROM checksums WHERE version_id = ?1 ORDER BY path",
        )?;

        let entries = stmt
            .query_map([version_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// A version's baseline as a path -> hash map
    pub fn map_for_version(conn: &Connection, version_id: i64) -> Result<ChecksumMap> {
        let mut stmt = conn.prepare("SELECT path, hash FROM checksums WHERE version_id = ?1")?;

        let map = stmt
            .query_map([version_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<ChecksumMap, _>>()?;

        Ok(map)
    }

    pub fn count_for_version(conn: &Connection, version_id: i64) -> Result<i64> {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM checksums WHERE version_id = ?1",
            [version_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn delete_for_version(conn: &Connection, version_id: i64) -> Result<()> {
        conn.execute("DELETE FROM checksums WHERE version_id = ?1", [version_id])?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            version_id: row.get(1)?,
            path: row.get(2)?,
            hash: row.get(3)?,
        })
    }
}
