//! Timestamped save backups
//!
//! This crate provides:
//! - Backup materialization (single file or whole folder tree)
//! - Backup records and listing of the backups directory

pub mod materialize;
pub mod record;

// Re-exports
pub use materialize::{format_timestamp, BackupError, BackupMaterializer, TIMESTAMP_FORMAT};
pub use record::{list_backups, BackupEntry, BackupKind, BackupRecord};
