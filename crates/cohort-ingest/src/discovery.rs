//! File and session-directory discovery.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;

use crate::error::{IngestError, Result};

/// Pulls subject identifiers and visit numbers out of names like `B4_v2`.
#[derive(Debug, Clone)]
pub struct SessionNaming {
    subject: Regex,
    timepoint: Regex,
}

impl SessionNaming {
    /// `timepoint_pattern` must capture the visit digits in group 1.
    pub fn new(subject_pattern: &str, timepoint_pattern: &str) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|source| IngestError::Pattern {
                pattern: pattern.to_string(),
                source,
            })
        };
        Ok(Self {
            subject: compile(subject_pattern)?,
            timepoint: compile(timepoint_pattern)?,
        })
    }

    /// First match of the subject pattern.
    pub fn subject_id(&self, name: &str) -> Option<String> {
        self.subject.find(name).map(|m| m.as_str().to_string())
    }

    pub fn timepoint(&self, name: &str) -> Option<i64> {
        self.timepoint
            .captures(name)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }
}

/// One subject/visit processing directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDir {
    pub path: PathBuf,
    pub name: String,
    pub subject: String,
    pub timepoint: i64,
}

fn read_dir_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(IngestError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }
    let entries = fs::read_dir(dir).map_err(|e| IngestError::DirectoryRead {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| IngestError::DirectoryRead {
            path: dir.to_path_buf(),
            source: e,
        })?;
        paths.push(entry.path());
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

/// Files directly under `dir` whose name starts with `prefix` and ends with
/// `extension` (case-insensitive), sorted by file name.
pub fn list_files(dir: &Path, prefix: &str, extension: &str) -> Result<Vec<PathBuf>> {
    let wanted = extension.trim_start_matches('.');
    Ok(read_dir_entries(dir)?
        .into_iter()
        .filter(|path| path.is_file())
        .filter(|path| file_name(path).starts_with(prefix))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted))
        })
        .collect())
}

/// Every file below `dir` whose name starts with `prefix`, skipping any
/// whose path relative to `dir` contains an excluded token.
pub fn find_files_recursive(dir: &Path, prefix: &str, exclude: &[String]) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for path in read_dir_entries(&current)? {
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            if !file_name(&path).starts_with(prefix) {
                continue;
            }
            let relative = path.strip_prefix(dir).unwrap_or(&path).to_string_lossy();
            if let Some(token) = exclude.iter().find(|token| relative.contains(token.as_str())) {
                debug!(path = %path.display(), token = %token, "excluded scan");
                continue;
            }
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// Subject/visit directories under `root`.
///
/// Longitudinal template directories (name contains `long`) and directories
/// without both a subject id and a visit number are left out.
pub fn discover_sessions(root: &Path, naming: &SessionNaming) -> Result<Vec<SessionDir>> {
    let mut sessions = Vec::new();
    for path in read_dir_entries(root)? {
        if !path.is_dir() {
            continue;
        }
        let name = file_name(&path).to_string();
        if name.contains("long") {
            debug!(session = %name, "skipping longitudinal directory");
            continue;
        }
        match (naming.subject_id(&name), naming.timepoint(&name)) {
            (Some(subject), Some(timepoint)) => sessions.push(SessionDir {
                path,
                name,
                subject,
                timepoint,
            }),
            _ => debug!(session = %name, "directory name has no subject or visit"),
        }
    }
    Ok(sessions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naming_extracts_subject_and_visit() {
        let naming = SessionNaming::new(r"[A-Z]\d", r"_v(\d)").unwrap();
        assert_eq!(naming.subject_id("pnB4_v2.nii"), Some("B4".to_string()));
        assert_eq!(naming.timepoint("pnB4_v2.nii"), Some(2));
        assert_eq!(naming.timepoint("B4"), None);
        assert_eq!(naming.subject_id("b4_v1"), None);
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = SessionNaming::new("(", r"_v(\d)").unwrap_err();
        assert!(matches!(err, IngestError::Pattern { .. }));
    }
}
