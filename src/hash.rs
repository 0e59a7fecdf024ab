// src/hash.rs

//! Content digests for change detection
//!
//! Checksum baselines and live snapshots only need to tell "same content"
//! from "different content", so the default is a fast non-cryptographic
//! digest:
//! - **XXH128** (default): ~30 GB/s, used for baselines and live snapshots
//! - **SHA-256**: available when baselines must match externally published
//!   checksums
//!
//! A baseline and a live snapshot are only comparable when both were
//! computed with the same algorithm.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;
use xxhash_rust::xxh3::{Xxh3, xxh3_128};

/// Hash algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// XXH128 (128-bit non-cryptographic hash)
    #[default]
    Xxh128,

    /// SHA-256 (256-bit cryptographic hash)
    Sha256,
}

impl HashAlgorithm {
    /// Get the hash output length in bytes
    #[inline]
    pub const fn output_len(&self) -> usize {
        match self {
            Self::Xxh128 => 16,
            Self::Sha256 => 32,
        }
    }

    /// Get the hash output length as a hex string
    #[inline]
    pub const fn hex_len(&self) -> usize {
        self.output_len() * 2
    }

    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Xxh128 => "xxh128",
            Self::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "xxh128" | "xxhash" | "xxh3" => Ok(Self::Xxh128),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            _ => Err(HashError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Hash parsing errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    /// Unknown hash algorithm name
    UnknownAlgorithm(String),
}

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownAlgorithm(name) => write!(f, "unknown hash algorithm: {}", name),
        }
    }
}

impl std::error::Error for HashError {}

/// Incremental hasher over any supported algorithm
pub struct Hasher {
    state: HasherState,
}

enum HasherState {
    Xxh128(Box<Xxh3>),
    Sha256(Sha256),
}

impl Hasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Xxh128 => HasherState::Xxh128(Box::new(Xxh3::new())),
            HashAlgorithm::Sha256 => HasherState::Sha256(Sha256::new()),
        };
        Self { state }
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HasherState::Xxh128(hasher) => hasher.update(data),
            HasherState::Sha256(hasher) => hasher.update(data),
        }
    }

    /// Finalize and return the lowercase hex digest
    pub fn finalize(self) -> String {
        match self.state {
            HasherState::Xxh128(hasher) => format!("{:032x}", hasher.digest128()),
            HasherState::Sha256(hasher) => format!("{:x}", hasher.finalize()),
        }
    }
}

/// Compute the hex digest of a byte slice
pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> String {
    match algorithm {
        HashAlgorithm::Xxh128 => format!("{:032x}", xxh3_128(data)),
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(data);
            format!("{:x}", hasher.finalize())
        }
    }
}

/// Compute the hex digest of everything a reader yields
pub fn hash_reader<R: Read>(algorithm: HashAlgorithm, reader: &mut R) -> io::Result<String> {
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize())
}

/// Stream a file through the hasher without loading it into memory
pub fn hash_file(algorithm: HashAlgorithm, path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    hash_reader(algorithm, &mut file)
}

/// Compute XXH128 hash (convenience function)
#[inline]
pub fn xxh128(data: &[u8]) -> String {
    hash_bytes(HashAlgorithm::Xxh128, data)
}
