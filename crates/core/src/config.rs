//! `config.json` handling
//!
//! [`Config`] is the raw file format, kept as strings so that a typo in one
//! field never prevents the rest of the file from loading. [`Config::resolve`]
//! turns it into [`Settings`], replacing every malformed value with its default
//! and reporting each replacement as a [`ConfigWarning`].

use crate::duration::{format_duration, parse_duration, DurationError};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name of the configuration file
pub const CONFIG_FILE_NAME: &str = "config.json";

pub const DEFAULT_ALARM_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_secs(3);
pub const DEFAULT_REPEAT_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_ALARM_VOLUME: u8 = 100;

/// Raw configuration as stored on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Time before the first alarm (e.g. "5m", "300s")
    pub alarm_interval: String,
    /// Quiet period after the last file change (e.g. "3s")
    pub debounce_delay: String,
    /// Time between repeat alarms (e.g. "5m")
    pub repeat_interval: String,
    /// Audio file to play (empty = system beep)
    pub alarm_sound_file: String,
    /// Alarm volume, 0-100 (0 = muted)
    pub alarm_volume: i64,
    /// Log every file event
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            alarm_interval: format_duration(DEFAULT_ALARM_INTERVAL),
            debounce_delay: format_duration(DEFAULT_DEBOUNCE_DELAY),
            repeat_interval: format_duration(DEFAULT_REPEAT_INTERVAL),
            alarm_sound_file: String::new(),
            alarm_volume: i64::from(DEFAULT_ALARM_VOLUME),
            verbose_logging: false,
        }
    }
}

/// How the alarm should sound once resolved against the filesystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmSound {
    /// Volume is zero; nothing is played
    Muted,
    /// Console / system beep
    Beep,
    /// Play an audio file
    File(PathBuf),
}

/// Validated configuration used by the watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub alarm_interval: Duration,
    pub debounce_delay: Duration,
    pub repeat_interval: Duration,
    pub alarm_volume: u8,
    pub alarm_sound: AlarmSound,
    pub verbose_logging: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            alarm_interval: DEFAULT_ALARM_INTERVAL,
            debounce_delay: DEFAULT_DEBOUNCE_DELAY,
            repeat_interval: DEFAULT_REPEAT_INTERVAL,
            alarm_volume: DEFAULT_ALARM_VOLUME,
            alarm_sound: AlarmSound::Beep,
            verbose_logging: false,
        }
    }
}

impl Settings {
    /// One human-readable line per setting, for startup logs and `config list`
    pub fn summary(&self) -> Vec<String> {
        let sound = match &self.alarm_sound {
            AlarmSound::Muted => "muted".to_string(),
            AlarmSound::Beep => "system beep".to_string(),
            AlarmSound::File(path) => path.display().to_string(),
        };

        vec![
            format!("Alarm interval: {}", format_duration(self.alarm_interval)),
            format!("Debounce delay: {}", format_duration(self.debounce_delay)),
            format!("Repeat interval: {}", format_duration(self.repeat_interval)),
            format!("Alarm volume: {}%", self.alarm_volume),
            format!("Alarm sound: {}", sound),
            format!("Verbose logging: {}", self.verbose_logging),
        ]
    }
}

/// A configuration value that was replaced by a fallback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A duration field could not be used
    InvalidDuration {
        key: &'static str,
        value: String,
        fallback: Duration,
        reason: String,
    },
    /// Volume was outside 0-100
    VolumeClamped { value: i64, clamped: u8 },
    /// Sound file was not found; the system beep is used instead
    SoundFileNotFound { path: String },
    /// The config file existed but could not be used at all
    Unreadable { path: PathBuf, reason: String },
    /// The default config file could not be written
    NotCreated { path: PathBuf, reason: String },
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::InvalidDuration { key, value, fallback, reason } => write!(
                f,
                "invalid {} {:?} ({}), using {}",
                key,
                value,
                reason,
                format_duration(*fallback)
            ),
            ConfigWarning::VolumeClamped { value, clamped } => {
                write!(f, "alarm_volume {} is outside 0-100, using {}", value, clamped)
            }
            ConfigWarning::SoundFileNotFound { path } => {
                write!(f, "audio file not found: {}, using system beep instead", path)
            }
            ConfigWarning::Unreadable { path, reason } => write!(
                f,
                "could not load config from {}, using defaults: {}",
                path.display(),
                reason
            ),
            ConfigWarning::NotCreated { path, reason } => write!(
                f,
                "failed to create default config file {}: {}",
                path.display(),
                reason
            ),
        }
    }
}

impl Config {
    /// Read and parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Write the config as indented JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory {}", parent.display())
                })?;
            }
        }

        std::fs::write(path, data)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Load the config file, creating it with defaults if it does not exist
    ///
    /// Never fails: an unusable file yields the defaults plus a warning.
    pub fn load_or_create(path: &Path) -> (Self, Vec<ConfigWarning>) {
        if !path.exists() {
            let config = Config::default();
            return match config.save(path) {
                Ok(()) => (config, Vec::new()),
                Err(e) => {
                    let warning = ConfigWarning::NotCreated {
                        path: path.to_path_buf(),
                        reason: format!("{:#}", e),
                    };
                    (config, vec![warning])
                }
            };
        }

        match Config::load(path) {
            Ok(config) => (config, Vec::new()),
            Err(e) => {
                let warning = ConfigWarning::Unreadable {
                    path: path.to_path_buf(),
                    reason: format!("{:#}", e),
                };
                (Config::default(), vec![warning])
            }
        }
    }

    /// Validate every field, falling back to defaults where needed
    ///
    /// Relative sound file paths are looked up in `base_dir` first, then in
    /// the current working directory.
    pub fn resolve(&self, base_dir: &Path) -> (Settings, Vec<ConfigWarning>) {
        let mut warnings = Vec::new();

        let alarm_interval = resolve_duration(
            "alarm_interval",
            &self.alarm_interval,
            DEFAULT_ALARM_INTERVAL,
            &mut warnings,
        );
        let debounce_delay = resolve_duration(
            "debounce_delay",
            &self.debounce_delay,
            DEFAULT_DEBOUNCE_DELAY,
            &mut warnings,
        );
        let repeat_interval = resolve_duration(
            "repeat_interval",
            &self.repeat_interval,
            DEFAULT_REPEAT_INTERVAL,
            &mut warnings,
        );

        let alarm_volume = self.alarm_volume.clamp(0, 100) as u8;
        if i64::from(alarm_volume) != self.alarm_volume {
            warnings.push(ConfigWarning::VolumeClamped {
                value: self.alarm_volume,
                clamped: alarm_volume,
            });
        }

        let alarm_sound = if alarm_volume == 0 {
            AlarmSound::Muted
        } else if self.alarm_sound_file.trim().is_empty() {
            AlarmSound::Beep
        } else {
            match resolve_sound_path(self.alarm_sound_file.trim(), base_dir) {
                Some(path) => AlarmSound::File(path),
                None => {
                    warnings.push(ConfigWarning::SoundFileNotFound {
                        path: self.alarm_sound_file.clone(),
                    });
                    AlarmSound::Beep
                }
            }
        };

        let settings = Settings {
            alarm_interval,
            debounce_delay,
            repeat_interval,
            alarm_volume,
            alarm_sound,
            verbose_logging: self.verbose_logging,
        };

        (settings, warnings)
    }

    /// Pretty-printed default configuration
    pub fn example() -> String {
        serde_json::to_string_pretty(&Config::default()).unwrap_or_default()
    }
}

/// Parse one duration field; empty strings silently take the default
fn resolve_duration(
    key: &'static str,
    value: &str,
    fallback: Duration,
    warnings: &mut Vec<ConfigWarning>,
) -> Duration {
    match parse_duration(value) {
        Ok(duration) if !duration.is_zero() => duration,
        Ok(_) => {
            warnings.push(ConfigWarning::InvalidDuration {
                key,
                value: value.to_string(),
                fallback,
                reason: "must be greater than zero".to_string(),
            });
            fallback
        }
        Err(DurationError::Empty) => fallback,
        Err(e) => {
            warnings.push(ConfigWarning::InvalidDuration {
                key,
                value: value.to_string(),
                fallback,
                reason: e.to_string(),
            });
            fallback
        }
    }
}

/// Find an audio file given an absolute path or one relative to `base_dir`
pub fn resolve_sound_path(path: &str, base_dir: &Path) -> Option<PathBuf> {
    let candidate = Path::new(path);

    if candidate.is_absolute() {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let relative = base_dir.join(candidate);
    if relative.is_file() {
        return Some(relative);
    }

    candidate.is_file().then(|| candidate.to_path_buf())
}

/// Directory containing the running executable
pub fn executable_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Default config location: next to the executable
pub fn default_config_path() -> PathBuf {
    executable_dir().join(CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_resolve_cleanly() {
        let temp_dir = TempDir::new().unwrap();
        let (settings, warnings) = Config::default().resolve(temp_dir.path());

        assert!(warnings.is_empty());
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_malformed_duration_falls_back_with_warning() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            debounce_delay: "three seconds".to_string(),
            repeat_interval: "0s".to_string(),
            ..Config::default()
        };

        let (settings, warnings) = config.resolve(temp_dir.path());

        assert_eq!(settings.debounce_delay, DEFAULT_DEBOUNCE_DELAY);
        assert_eq!(settings.repeat_interval, DEFAULT_REPEAT_INTERVAL);
        assert_eq!(warnings.len(), 2);
        assert!(matches!(
            &warnings[0],
            ConfigWarning::InvalidDuration { key: "debounce_delay", .. }
        ));
        assert!(matches!(
            &warnings[1],
            ConfigWarning::InvalidDuration { key: "repeat_interval", .. }
        ));
        assert!(warnings[0].to_string().contains("using 3s"));
    }

    #[test]
    fn test_huge_duration_falls_back_with_warning() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            alarm_interval: "3000000000000000h".to_string(),
            debounce_delay: "2562048h".to_string(),
            ..Config::default()
        };

        let (settings, warnings) = config.resolve(temp_dir.path());

        assert_eq!(settings.alarm_interval, DEFAULT_ALARM_INTERVAL);
        assert_eq!(settings.debounce_delay, DEFAULT_DEBOUNCE_DELAY);
        assert_eq!(warnings.len(), 2);
        assert!(matches!(
            &warnings[0],
            ConfigWarning::InvalidDuration { key: "alarm_interval", .. }
        ));
        assert!(warnings[0].to_string().contains("out of range"));

        // The fallback is usable as a deadline offset
        let now = std::time::Instant::now();
        assert!(now.checked_add(settings.alarm_interval).is_some());
    }

    #[test]
    fn test_empty_duration_uses_default_silently() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            alarm_interval: String::new(),
            ..Config::default()
        };

        let (settings, warnings) = config.resolve(temp_dir.path());
        assert_eq!(settings.alarm_interval, DEFAULT_ALARM_INTERVAL);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_volume_is_clamped() {
        let temp_dir = TempDir::new().unwrap();

        let loud = Config { alarm_volume: 250, ..Config::default() };
        let (settings, warnings) = loud.resolve(temp_dir.path());
        assert_eq!(settings.alarm_volume, 100);
        assert_eq!(
            warnings,
            vec![ConfigWarning::VolumeClamped { value: 250, clamped: 100 }]
        );

        let negative = Config { alarm_volume: -5, ..Config::default() };
        let (settings, _) = negative.resolve(temp_dir.path());
        assert_eq!(settings.alarm_volume, 0);
        assert_eq!(settings.alarm_sound, AlarmSound::Muted);
    }

    #[test]
    fn test_sound_file_resolution() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("alarm.wav"), b"RIFF").unwrap();

        let relative = Config {
            alarm_sound_file: "alarm.wav".to_string(),
            ..Config::default()
        };
        let (settings, warnings) = relative.resolve(temp_dir.path());
        assert!(warnings.is_empty());
        assert_eq!(
            settings.alarm_sound,
            AlarmSound::File(temp_dir.path().join("alarm.wav"))
        );

        let missing = Config {
            alarm_sound_file: "missing.mp3".to_string(),
            ..Config::default()
        };
        let (settings, warnings) = missing.resolve(temp_dir.path());
        assert_eq!(settings.alarm_sound, AlarmSound::Beep);
        assert!(matches!(&warnings[0], ConfigWarning::SoundFileNotFound { .. }));
    }

    #[test]
    fn test_load_or_create_writes_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);

        let (config, warnings) = Config::load_or_create(&path);
        assert!(warnings.is_empty());
        assert_eq!(config, Config::default());
        assert!(path.exists());

        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded, Config::default());
    }

    #[test]
    fn test_load_or_create_reports_unparseable_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, b"{ not json").unwrap();

        let (config, warnings) = Config::load_or_create(&path);
        assert_eq!(config, Config::default());
        assert!(matches!(&warnings[0], ConfigWarning::Unreadable { .. }));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, br#"{ "alarm_interval": "10m", "verbose_logging": true }"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.alarm_interval, "10m");
        assert_eq!(config.debounce_delay, "3s");
        assert_eq!(config.alarm_volume, 100);
        assert!(config.verbose_logging);
    }

    #[test]
    fn test_example_is_valid_json() {
        let parsed: Config = serde_json::from_str(&Config::example()).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_settings_summary() {
        let settings = Settings {
            alarm_volume: 0,
            alarm_sound: AlarmSound::Muted,
            ..Settings::default()
        };

        let lines = settings.summary();
        assert_eq!(lines[0], "Alarm interval: 5m");
        assert_eq!(lines[1], "Debounce delay: 3s");
        assert!(lines.contains(&"Alarm volume: 0%".to_string()));
        assert!(lines.contains(&"Alarm sound: muted".to_string()));
    }
}
