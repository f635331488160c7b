//! Configuration command
//!
//! Shows the effective settings, where the config file lives, and what a
//! default file looks like.

use super::GlobalOptions;
use anyhow::Result;
use cli_lib::util;
use keeper_core::config::{executable_dir, ConfigWarning};
use keeper_core::{Config, Settings};
use owo_colors::OwoColorize;

/// List the raw and effective configuration values
pub fn run_list(options: &GlobalOptions) -> Result<()> {
    let config_path = util::config_path(options.config.as_deref());

    // Read-only: a missing file is reported, not created
    let (config, mut warnings) = if config_path.exists() {
        match Config::load(&config_path) {
            Ok(config) => (config, Vec::new()),
            Err(e) => (
                Config::default(),
                vec![ConfigWarning::Unreadable {
                    path: config_path.clone(),
                    reason: format!("{:#}", e),
                }],
            ),
        }
    } else {
        (Config::default(), Vec::new())
    };
    let (settings, resolve_warnings) = config.resolve(&executable_dir());
    warnings.extend(resolve_warnings);

    println!("{}", "Savekeeper Configuration".bold());
    if config_path.exists() {
        println!("{}: {}\n", "Location".dimmed(), config_path.display().dimmed());
    } else {
        println!(
            "{}: {} {}\n",
            "Location".dimmed(),
            config_path.display().dimmed(),
            "(not created yet, showing defaults)".yellow()
        );
    }

    print_raw(&config);
    print_effective(&settings);

    if !warnings.is_empty() {
        println!("\n{}", "Warnings:".yellow().bold());
        for warning in &warnings {
            println!("  {} {}", "!".yellow(), warning);
        }
    }

    Ok(())
}

/// Print the config file path, optionally writing a default file there
pub fn run_path(options: &GlobalOptions, create: bool) -> Result<()> {
    let config_path = util::config_path(options.config.as_deref());

    if create && !config_path.exists() {
        Config::default().save(&config_path)?;
        println!("{} {}", "Created".green(), config_path.display());
        return Ok(());
    }

    println!("{}", config_path.display());
    Ok(())
}

/// Print a default config file
pub fn run_example() -> Result<()> {
    println!("{}", Config::example());
    Ok(())
}

fn print_raw(config: &Config) {
    println!("{}", "[config.json]".yellow());
    println!("  {} = {:?}", "alarm_interval".cyan(), config.alarm_interval);
    println!("  {} = {:?}", "debounce_delay".cyan(), config.debounce_delay);
    println!("  {} = {:?}", "repeat_interval".cyan(), config.repeat_interval);
    println!(
        "  {} = {:?} {}",
        "alarm_sound_file".cyan(),
        config.alarm_sound_file,
        if config.alarm_sound_file.is_empty() {
            "(system beep)".dimmed().to_string()
        } else {
            String::new()
        }
    );
    println!(
        "  {} = {} {}",
        "alarm_volume".cyan(),
        config.alarm_volume,
        if config.alarm_volume == 0 {
            "(muted)".dimmed().to_string()
        } else {
            String::new()
        }
    );
    println!("  {} = {}", "verbose_logging".cyan(), config.verbose_logging);
}

fn print_effective(settings: &Settings) {
    println!("\n{}", "[effective]".yellow());
    for line in settings.summary() {
        println!("  {}", line);
    }

    println!("\n{}", "Valid Ranges:".bold());
    println!("  durations: Go syntax, e.g. 300ms, 3s, 5m, 1h30m (must be > 0)");
    println!("  alarm_volume: 0-100 (0 = muted)");
}
