//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use keeper_core::config::default_config_path;
use keeper_core::{WatchTarget, BACKUP_FOLDER_NAME};
use std::path::{Path, PathBuf};

/// Game folder under the user's documents
const GAME_DIR: &str = "Neverwinter Nights 2";

/// The user's documents folder, falling back to `~/Documents`
pub fn documents_dir() -> Option<PathBuf> {
    dirs::document_dir().or_else(|| dirs::home_dir().map(|home| home.join("Documents")))
}

/// `<Documents>/Neverwinter Nights 2/saves/multiplayer`
pub fn default_saves_dir() -> Result<PathBuf> {
    let documents = documents_dir().context("Could not determine the documents folder")?;
    Ok(documents.join(GAME_DIR).join("saves").join("multiplayer"))
}

/// Config file from `--config`, or the one next to the executable
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(default_config_path)
}

/// Build the watch target from CLI overrides
pub fn resolve_target(saves_dir: Option<&Path>, name: Option<&str>) -> Result<WatchTarget> {
    let parent = match saves_dir {
        Some(dir) => dir.to_path_buf(),
        None => default_saves_dir()?,
    };

    Ok(match name {
        Some(name) => WatchTarget::new(parent, name),
        None => WatchTarget::quicksave(parent),
    })
}

/// Save folders currently in `saves_dir`, sorted by name
///
/// The backups folder and hidden entries are left out.
pub fn list_save_folders(saves_dir: &Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(saves_dir)
        .with_context(|| format!("Could not read folder contents: {}", saves_dir.display()))?;

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name != BACKUP_FOLDER_NAME && !name.starts_with('.'))
        .collect();
    names.sort();
    Ok(names)
}

/// Keep a double-clicked console window open long enough to read the error
#[cfg(windows)]
pub fn pause_before_exit() {
    use std::io::IsTerminal;

    if std::io::stdin().is_terminal() {
        let _ = std::process::Command::new("cmd").args(["/C", "pause"]).status();
    }
}

#[cfg(not(windows))]
pub fn pause_before_exit() {}

/// Format file size in human-readable format
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format a backup time relative to now ("2 hours ago")
pub fn format_age(taken_at: &NaiveDateTime) -> String {
    format_age_since(taken_at, &Local::now().naive_local())
}

fn format_age_since(taken_at: &NaiveDateTime, now: &NaiveDateTime) -> String {
    let seconds = now.signed_duration_since(*taken_at).num_seconds();

    if seconds < 0 {
        "in the future".to_string()
    } else if seconds < 60 {
        format!("{} seconds ago", seconds)
    } else if seconds < 3600 {
        format!("{} minutes ago", seconds / 60)
    } else if seconds < 86400 {
        format!("{} hours ago", seconds / 3600)
    } else if seconds < 604800 {
        format!("{} days ago", seconds / 86400)
    } else {
        format!("{} weeks ago", seconds / 604800)
    }
}
