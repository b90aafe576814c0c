//! Content fingerprints: SHA-256 of a file's bytes, rendered as lowercase hex.

use crate::fs::Filesystem;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Length of a rendered fingerprint in hex characters
pub const FINGERPRINT_HEX_LEN: usize = 64;

#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// SHA-256 digest of a file's content as a 64-character lowercase hex string
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint an in-memory byte sequence
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(data)))
    }

    /// Parse a stored fingerprint, normalizing case
    ///
    /// Returns `None` unless the input is exactly 64 hex digits.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() == FINGERPRINT_HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(s.to_ascii_lowercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// File content together with its fingerprint
///
/// The same bytes that were hashed are the ones transmitted.
#[derive(Debug, Clone)]
pub struct FingerprintedContent {
    pub fingerprint: Fingerprint,
    pub data: Vec<u8>,
}

/// Read `path` in full and fingerprint it
pub fn fingerprint_file(
    fs: &dyn Filesystem,
    path: &Path,
) -> Result<FingerprintedContent, FingerprintError> {
    let data = fs.read(path).map_err(|source| FingerprintError::Read {
        path: path.display().to_string(),
        source,
    })?;

    Ok(FingerprintedContent {
        fingerprint: Fingerprint::of_bytes(&data),
        data,
    })
}
