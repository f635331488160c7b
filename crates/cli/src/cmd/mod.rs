//! CLI command implementations

pub mod backups;
pub mod config;
pub mod watch;

use std::path::PathBuf;

/// Options shared by every command
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub saves_dir: Option<PathBuf>,
    pub target: Option<String>,
    pub verbose: bool,
}
