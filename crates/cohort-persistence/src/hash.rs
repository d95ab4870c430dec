//! Content hashes of persisted tables.

use std::fs::File;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{PersistenceError, Result};

/// Hex-encoded SHA-256 of a file's contents.
pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| PersistenceError::io("open", path, e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| PersistenceError::io("read", path, e))?;
    Ok(hex::encode(hasher.finalize()))
}

/// `Ok(false)` when the file exists but its contents changed.
pub fn matches_sha256(path: &Path, expected: &str) -> Result<bool> {
    Ok(file_sha256(path)?.eq_ignore_ascii_case(expected))
}
