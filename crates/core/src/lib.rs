//! Savekeeper Core - shared types for the save watcher
//!
//! This crate provides the pieces every other crate agrees on:
//! - Go-style duration parsing (`5m`, `300s`, `1h30m`)
//! - The on-disk `config.json` format and its resolved settings
//! - The watch target (which directory entry counts as "the save")

pub mod config;
pub mod duration;
pub mod target;

// Re-export main types for convenience
pub use config::{AlarmSound, Config, ConfigWarning, Settings};
pub use duration::{format_duration, parse_duration, DurationError};
pub use target::{WatchTarget, QUICKSAVE_NAME};

/// Name of the folder (inside the watched directory) that receives backups
pub const BACKUP_FOLDER_NAME: &str = "backups";
