//! List existing backups

use super::GlobalOptions;
use anyhow::{Context, Result};
use backup::{list_backups, BackupKind};
use cli_lib::util::{self, format_age, format_size};
use owo_colors::OwoColorize;

pub fn run(options: &GlobalOptions, limit: usize) -> Result<()> {
    let target = util::resolve_target(options.saves_dir.as_deref(), options.target.as_deref())?;
    let backups_dir = target.backups_dir();

    if !backups_dir.is_dir() {
        println!(
            "{} {}",
            "No backups yet:".dimmed(),
            backups_dir.display().dimmed()
        );
        return Ok(());
    }

    let entries = list_backups(&backups_dir)
        .with_context(|| format!("Failed to list backups in {}", backups_dir.display()))?;

    println!("{}", "Backups".bold());
    println!("{}: {}\n", "Location".dimmed(), backups_dir.display().dimmed());

    if entries.is_empty() {
        println!("{}", "No backups yet".dimmed());
        return Ok(());
    }

    let total_size: u64 = entries.iter().map(|e| e.size_bytes).sum();

    for entry in entries.iter().take(limit) {
        let age = entry
            .taken_at
            .as_ref()
            .map(format_age)
            .unwrap_or_else(|| "unknown time".to_string());
        let kind = match entry.kind {
            BackupKind::Folder => "folder",
            BackupKind::File => "file",
        };

        println!(
            "{} {} {} - {} files, {}",
            entry.name.yellow(),
            age.dimmed(),
            kind.cyan(),
            entry.file_count,
            format_size(entry.size_bytes)
        );
    }

    if entries.len() > limit {
        println!(
            "\n{}",
            format!("... and {} more", entries.len() - limit).dimmed()
        );
    }

    println!(
        "\n{} {} backups, {}",
        "Total:".bold(),
        entries.len(),
        format_size(total_size)
    );

    Ok(())
}
