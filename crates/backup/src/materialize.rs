//! Copy a save into a timestamped backup directory
//!
//! Layout inside the backups directory:
//! ```text
//! backups/
//!   2024-01-03_14-30-00 - 000000 - quicksave/   (folder save, tree mirrored)
//!     save.dat
//!     nested/...
//!   2024-01-03_14-35-12/                        (single-file save)
//!     000000 - quicksave.sav
//! ```
//!
//! Timestamps have one-second resolution. Two backups of the same save in
//! the same second land in the same directory and the later one overwrites
//! the earlier files.
//!
//! Every file is written to a temporary file next to its destination, synced,
//! length-checked and then renamed, so a destination file is either complete
//! or absent. A tree copy that fails halfway leaves the files copied so far.

use crate::record::{BackupKind, BackupRecord};
use chrono::{Local, NaiveDateTime};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Format of backup directory timestamps
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Errors raised while creating or listing backups
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("save not found: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write backup file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create backup directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("incomplete write to {}: expected {expected} bytes, found {written}", path.display())]
    ShortWrite {
        path: PathBuf,
        expected: u64,
        written: u64,
    },
}

/// Format a backup timestamp (`YYYY-MM-DD_HH-MM-SS`)
pub fn format_timestamp(when: &NaiveDateTime) -> String {
    when.format(TIMESTAMP_FORMAT).to_string()
}

/// Creates backups inside one backups directory
#[derive(Debug, Clone)]
pub struct BackupMaterializer {
    backups_dir: PathBuf,
}

impl BackupMaterializer {
    pub fn new(backups_dir: impl Into<PathBuf>) -> Self {
        Self {
            backups_dir: backups_dir.into(),
        }
    }

    pub fn backups_dir(&self) -> &Path {
        &self.backups_dir
    }

    /// Create the backups directory if needed
    pub fn ensure_dir(&self) -> Result<(), BackupError> {
        fs::create_dir_all(&self.backups_dir).map_err(|source| BackupError::CreateDir {
            path: self.backups_dir.clone(),
            source,
        })
    }

    /// Back up `source` using the current local time
    pub fn backup(&self, source: &Path) -> Result<BackupRecord, BackupError> {
        self.backup_at(source, Local::now().naive_local())
    }

    /// Back up `source` into a directory named after `when`
    pub fn backup_at(
        &self,
        source: &Path,
        when: NaiveDateTime,
    ) -> Result<BackupRecord, BackupError> {
        let metadata = fs::metadata(source).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                BackupError::SourceMissing(source.to_path_buf())
            } else {
                BackupError::Read {
                    path: source.to_path_buf(),
                    source: e,
                }
            }
        })?;

        let name = source
            .file_name()
            .ok_or_else(|| BackupError::SourceMissing(source.to_path_buf()))?;
        let timestamp = format_timestamp(&when);

        let record = if metadata.is_dir() {
            let destination = self
                .backups_dir
                .join(format!("{} - {}", timestamp, name.to_string_lossy()));
            let (files_copied, bytes_copied) = self.copy_tree(source, &destination)?;

            BackupRecord {
                source: source.to_path_buf(),
                destination,
                timestamp: when,
                kind: BackupKind::Folder,
                files_copied,
                bytes_copied,
            }
        } else {
            let destination = self.backups_dir.join(&timestamp);
            create_dir(&destination)?;
            let bytes_copied = copy_file(source, &destination.join(name))?;

            BackupRecord {
                source: source.to_path_buf(),
                destination,
                timestamp: when,
                kind: BackupKind::File,
                files_copied: 1,
                bytes_copied,
            }
        };

        info!("Backup created: {}", record.destination.display());
        Ok(record)
    }

    /// Mirror the tree under `src` into `dst`
    ///
    /// Returns (files copied, bytes copied).
    fn copy_tree(&self, src: &Path, dst: &Path) -> Result<(usize, u64), BackupError> {
        let mut files = 0usize;
        let mut bytes = 0u64;

        let walker = WalkDir::new(src)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            // Never copy the backups directory into itself
            .filter_entry(|e| e.path() != self.backups_dir);

        for entry in walker {
            let entry = entry.map_err(|source| BackupError::Walk {
                path: src.to_path_buf(),
                source,
            })?;

            let relative = entry
                .path()
                .strip_prefix(src)
                .map_err(|_| BackupError::SourceMissing(entry.path().to_path_buf()))?;
            let target = dst.join(relative);

            if entry.file_type().is_dir() {
                create_dir(&target)?;
            } else {
                bytes += copy_file(entry.path(), &target)?;
                files += 1;
            }
        }

        debug!("Copied {} files ({} bytes) into {}", files, bytes, dst.display());
        Ok((files, bytes))
    }
}

fn create_dir(path: &Path) -> Result<(), BackupError> {
    fs::create_dir_all(path).map_err(|source| BackupError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

/// Copy one file all-or-nothing; returns the number of bytes written
fn copy_file(src: &Path, dst: &Path) -> Result<u64, BackupError> {
    let read_err = |source| BackupError::Read {
        path: src.to_path_buf(),
        source,
    };
    let write_err = |source| BackupError::Write {
        path: dst.to_path_buf(),
        source,
    };

    let data = fs::read(src).map_err(read_err)?;
    let permissions = fs::metadata(src).map_err(read_err)?.permissions();

    let parent = dst.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;

    tmp.write_all(&data).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;

    let written = tmp.as_file().metadata().map_err(write_err)?.len();
    let expected = data.len() as u64;
    if written != expected {
        return Err(BackupError::ShortWrite {
            path: dst.to_path_buf(),
            expected,
            written,
        });
    }

    fs::set_permissions(tmp.path(), permissions).map_err(write_err)?;
    tmp.persist(dst).map_err(|e| write_err(e.error))?;

    Ok(expected)
}
