//! `manifest.json`: which persisted copy of each table is current.
//!
//! Every persist records the new file stem and the Parquet content hash under
//! the table's prefix. Readers trust an entry only while the hash still
//! matches the file on disk.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PersistenceError, Result};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// `{prefix}_{YYYYMMDD-HHMMSS}`; the CSV and Parquet files share it.
    pub stem: String,
    pub sha256: String,
    pub rows: usize,
    pub columns: usize,
    /// RFC 3339 local time of the write.
    pub written_at: String,
}

impl ManifestEntry {
    pub fn parquet_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.parquet", self.stem))
    }

    pub fn csv_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.csv", self.stem))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    #[serde(default)]
    pub tables: BTreeMap<String, ManifestEntry>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            tables: BTreeMap::new(),
        }
    }
}

impl Manifest {
    pub fn path(dir: &Path) -> PathBuf {
        dir.join(MANIFEST_FILE)
    }

    /// Manifest of `dir`, or an empty one when the directory has none.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = Self::path(dir);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(error) => return Err(PersistenceError::io("read", path, error)),
        };
        serde_json::from_str(&text).map_err(|source| PersistenceError::Manifest { path, source })
    }

    pub fn get(&self, prefix: &str) -> Option<&ManifestEntry> {
        self.tables.get(prefix)
    }

    pub fn record(&mut self, prefix: &str, entry: ManifestEntry) {
        self.tables.insert(prefix.to_string(), entry);
    }

    /// Write to `dir` through a temp file and a rename, so readers never see
    /// a partial manifest.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let path = Self::path(dir);
        let temp_path = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(self).map_err(|source| PersistenceError::Manifest {
            path: path.clone(),
            source,
        })?;

        let mut file =
            File::create(&temp_path).map_err(|e| PersistenceError::io("create", &temp_path, e))?;
        file.write_all(&bytes)
            .map_err(|e| PersistenceError::io("write", &temp_path, e))?;
        file.sync_all()
            .map_err(|e| PersistenceError::io("sync", &temp_path, e))?;

        fs::rename(&temp_path, &path).map_err(|source| PersistenceError::AtomicWriteFailed {
            temp_path: temp_path.clone(),
            target_path: path.clone(),
            source,
        })
    }
}
