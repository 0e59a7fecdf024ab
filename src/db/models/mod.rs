// src/db/models/mod.rs

//! Data models for siteward database entities
//!
//! This module defines Rust structs that correspond to database tables
//! and provides methods for creating, reading, updating, and deleting records.

mod checksum;
mod instance;
mod version;

pub use checksum::ChecksumEntry;
pub use instance::{AccessKind, ApplicationKind, Credentials, Instance};
pub use version::{VcsKind, Version, VersionAction};

use rusqlite::Row;
use std::str::FromStr;

/// Read a text column and parse it into one of the model enums
pub(crate) fn parse_column<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let value: String = row.get(idx)?;
    value.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })
}
