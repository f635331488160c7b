//! Backup records and the on-disk backups listing

use crate::materialize::{BackupError, TIMESTAMP_FORMAT};
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Length of a formatted timestamp (`YYYY-MM-DD_HH-MM-SS`)
const TIMESTAMP_LEN: usize = 19;

/// Shape of the backed-up save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupKind {
    /// Single file copied into a timestamp directory
    File,
    /// Whole folder tree
    Folder,
}

/// Result of one successful backup. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    /// Save that was copied
    pub source: PathBuf,
    /// Directory created for this backup
    pub destination: PathBuf,
    /// Local time used to name the destination
    pub timestamp: NaiveDateTime,
    pub kind: BackupKind,
    pub files_copied: usize,
    pub bytes_copied: u64,
}

impl BackupRecord {
    /// Destination name as it appears in the backups directory
    pub fn name(&self) -> String {
        self.destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// A backup found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub name: String,
    pub path: PathBuf,
    /// Parsed from the name; `None` for directories not created by us
    pub taken_at: Option<NaiveDateTime>,
    pub kind: BackupKind,
    pub file_count: usize,
    pub size_bytes: u64,
}

/// List backups, newest first
///
/// A missing backups directory is an empty list. Hidden entries (such as
/// the instance lock file) and plain files are skipped.
pub fn list_backups(backups_dir: &Path) -> Result<Vec<BackupEntry>, BackupError> {
    if !backups_dir.exists() {
        return Ok(Vec::new());
    }

    let read_dir = std::fs::read_dir(backups_dir).map_err(|source| BackupError::Read {
        path: backups_dir.to_path_buf(),
        source,
    })?;

    let mut entries = Vec::new();

    for entry in read_dir {
        let entry = entry.map_err(|source| BackupError::Read {
            path: backups_dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();

        if name.starts_with('.') || !path.is_dir() {
            continue;
        }

        let taken_at = parse_backup_time(&name);
        let kind = if name.len() > TIMESTAMP_LEN {
            BackupKind::Folder
        } else {
            BackupKind::File
        };
        let (file_count, size_bytes) = tree_size(&path)?;

        entries.push(BackupEntry {
            name,
            path,
            taken_at,
            kind,
            file_count,
            size_bytes,
        });
    }

    // Timestamp names sort chronologically
    entries.sort_by(|a, b| b.name.cmp(&a.name));
    Ok(entries)
}

/// Parse the timestamp prefix of a backup directory name
pub fn parse_backup_time(name: &str) -> Option<NaiveDateTime> {
    let prefix = name.get(..TIMESTAMP_LEN)?;
    NaiveDateTime::parse_from_str(prefix, TIMESTAMP_FORMAT).ok()
}

/// Count files and bytes below `dir`
fn tree_size(dir: &Path) -> Result<(usize, u64), BackupError> {
    let mut files = 0usize;
    let mut bytes = 0u64;

    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|source| BackupError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;

        if entry.file_type().is_file() {
            files += 1;
            bytes += entry
                .metadata()
                .map_err(|source| BackupError::Walk {
                    path: entry.path().to_path_buf(),
                    source,
                })?
                .len();
        }
    }

    Ok((files, bytes))
}
