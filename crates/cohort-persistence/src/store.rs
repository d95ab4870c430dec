//! Timestamped table files in one output directory.
//!
//! Each persist writes `{prefix}_{YYYYMMDD-HHMMSS}.csv` for people and
//! `{prefix}_{YYYYMMDD-HHMMSS}.parquet` for the next stage, then points the
//! manifest at the new pair. Lookups go through the manifest first and fall
//! back to the most recently modified Parquet file of the prefix.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local, NaiveDateTime};
use cohort_model::TableName;
use polars::prelude::{CsvWriter, DataFrame, ParquetReader, ParquetWriter, SerReader, SerWriter};
use tracing::{debug, info, warn};

use crate::error::{PersistenceError, Result};
use crate::hash::{file_sha256, matches_sha256};
use crate::manifest::{Manifest, ManifestEntry};

const STAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// How a stored table was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Manifest entry whose hash still matches.
    Manifest,
    /// Newest file of the prefix by modification time.
    Modified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTable {
    pub prefix: String,
    pub stem: String,
    pub parquet: PathBuf,
    pub csv: PathBuf,
    pub resolution: Resolution,
}

/// Tables read back by [`TableStore::collect`].
#[derive(Debug, Default)]
pub struct Collected {
    pub tables: Vec<(TableName, DataFrame)>,
    pub sources: Vec<StoredTable>,
    /// Requested tables with no persisted copy.
    pub missing: Vec<TableName>,
}

#[derive(Debug, Clone)]
pub struct TableStore {
    dir: PathBuf,
}

impl TableStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn persist(&self, prefix: &str, df: &DataFrame) -> Result<StoredTable> {
        self.persist_at(prefix, df, Local::now())
    }

    /// Write the CSV/Parquet pair stamped with `time` and record it in the
    /// manifest.
    pub fn persist_at(&self, prefix: &str, df: &DataFrame, time: DateTime<Local>) -> Result<StoredTable> {
        fs::create_dir_all(&self.dir).map_err(|e| PersistenceError::io("create directory", &self.dir, e))?;
        let stem = format!("{prefix}_{}", time.format(STAMP_FORMAT));
        let csv = self.dir.join(format!("{stem}.csv"));
        let parquet = self.dir.join(format!("{stem}.parquet"));

        let mut frame = df.clone();
        let mut file = File::create(&csv).map_err(|e| PersistenceError::io("create", &csv, e))?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut frame)
            .map_err(|source| PersistenceError::Table {
                operation: "write",
                path: csv.clone(),
                source,
            })?;
        let file = File::create(&parquet).map_err(|e| PersistenceError::io("create", &parquet, e))?;
        ParquetWriter::new(file)
            .finish(&mut frame)
            .map_err(|source| PersistenceError::Table {
                operation: "write",
                path: parquet.clone(),
                source,
            })?;

        let entry = ManifestEntry {
            stem: stem.clone(),
            sha256: file_sha256(&parquet)?,
            rows: df.height(),
            columns: df.width(),
            written_at: time.to_rfc3339(),
        };
        let mut manifest = self.manifest();
        manifest.record(prefix, entry);
        manifest.save(&self.dir)?;
        info!(table = prefix, %stem, rows = df.height(), "persisted table");
        Ok(StoredTable {
            prefix: prefix.to_string(),
            stem,
            parquet,
            csv,
            resolution: Resolution::Manifest,
        })
    }

    /// An unreadable manifest is treated as empty so lookups fall back to
    /// file times.
    fn manifest(&self) -> Manifest {
        Manifest::load(&self.dir).unwrap_or_else(|error| {
            warn!(dir = %self.dir.display(), %error, "ignoring unreadable manifest");
            Manifest::default()
        })
    }

    /// Current copy of a table, if any.
    pub fn latest(&self, prefix: &str) -> Result<Option<StoredTable>> {
        if let Some(entry) = self.manifest().get(prefix) {
            let parquet = entry.parquet_path(&self.dir);
            if parquet.is_file() && matches_sha256(&parquet, &entry.sha256)? {
                return Ok(Some(StoredTable {
                    prefix: prefix.to_string(),
                    stem: entry.stem.clone(),
                    csv: entry.csv_path(&self.dir),
                    parquet,
                    resolution: Resolution::Manifest,
                }));
            }
            warn!(table = prefix, stem = %entry.stem, "manifest entry is stale, using newest file");
        }
        self.newest_file(prefix)
    }

    fn newest_file(&self, prefix: &str) -> Result<Option<StoredTable>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(PersistenceError::io("read directory", &self.dir, error)),
        };
        let mut newest: Option<(SystemTime, String)> = None;
        for entry in entries {
            let entry = entry.map_err(|e| PersistenceError::io("read directory", &self.dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(stem) = stamped_stem(&name, prefix) else {
                continue;
            };
            let modified = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            let candidate = (modified, stem.to_string());
            if newest.as_ref().is_none_or(|current| candidate > *current) {
                newest = Some(candidate);
            }
        }
        Ok(newest.map(|(_, stem)| {
            debug!(table = prefix, %stem, "resolved by modification time");
            StoredTable {
                prefix: prefix.to_string(),
                parquet: self.dir.join(format!("{stem}.parquet")),
                csv: self.dir.join(format!("{stem}.csv")),
                stem,
                resolution: Resolution::Modified,
            }
        }))
    }

    pub fn read(&self, stored: &StoredTable) -> Result<DataFrame> {
        let file = File::open(&stored.parquet).map_err(|e| PersistenceError::io("open", &stored.parquet, e))?;
        ParquetReader::new(file)
            .finish()
            .map_err(|source| PersistenceError::Table {
                operation: "read",
                path: stored.parquet.clone(),
                source,
            })
    }

    /// Current copy of a table, or `NotFound`.
    pub fn load(&self, prefix: &str) -> Result<DataFrame> {
        let stored = self.latest(prefix)?.ok_or_else(|| PersistenceError::NotFound {
            prefix: prefix.to_string(),
            dir: self.dir.clone(),
        })?;
        self.read(&stored)
    }

    /// Load the current copy of each named table. Tables never persisted are
    /// listed in `missing` rather than failing the call.
    pub fn collect(&self, names: &[TableName]) -> Result<Collected> {
        let mut collected = Collected::default();
        for &name in names {
            match self.latest(name.prefix())? {
                Some(stored) => {
                    let df = self.read(&stored)?;
                    debug!(table = %name, stem = %stored.stem, rows = df.height(), "collected table");
                    collected.tables.push((name, df));
                    collected.sources.push(stored);
                }
                None => {
                    warn!(table = %name, dir = %self.dir.display(), "no persisted table");
                    collected.missing.push(name);
                }
            }
        }
        Ok(collected)
    }
}

/// `{prefix}_{YYYYMMDD-HHMMSS}` when `file_name` is a Parquet file of the
/// prefix; a longer prefix sharing the start (`cogtests` / `cogtestdates`)
/// does not match.
fn stamped_stem<'a>(file_name: &'a str, prefix: &str) -> Option<&'a str> {
    let stem = file_name.strip_suffix(".parquet")?;
    let stamp = stem.strip_prefix(prefix)?.strip_prefix('_')?;
    NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok()?;
    Some(stem)
}
