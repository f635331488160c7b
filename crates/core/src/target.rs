//! The save entity being watched

use crate::BACKUP_FOLDER_NAME;
use std::path::{Component, Path, PathBuf};

/// Name of the quicksave entry inside the saves directory
pub const QUICKSAVE_NAME: &str = "000000 - quicksave";

/// Identifies which entry of a directory counts as "the save"
///
/// An entry matches when its name starts with the target name, so both a
/// `000000 - quicksave` folder and a `000000 - quicksave.sav` file match the
/// default target. Anything nested below a matching entry matches too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    /// Directory holding the save entity
    parent: PathBuf,
    /// Entity name (prefix)
    name: String,
}

impl WatchTarget {
    /// Create a target for `name` inside `parent`
    pub fn new(parent: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            parent: parent.into(),
            name: name.into(),
        }
    }

    /// The default quicksave target inside `parent`
    pub fn quicksave(parent: impl Into<PathBuf>) -> Self {
        Self::new(parent, QUICKSAVE_NAME)
    }

    /// Directory being watched
    pub fn parent(&self) -> &Path {
        &self.parent
    }

    /// Entity name (prefix)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the entity under its exact name
    pub fn path(&self) -> PathBuf {
        self.parent.join(&self.name)
    }

    /// Directory that receives backups
    pub fn backups_dir(&self) -> PathBuf {
        self.parent.join(BACKUP_FOLDER_NAME)
    }

    /// Map a changed path to the top-level entity it belongs to
    ///
    /// Returns `None` for paths outside the parent directory, for the
    /// backups folder, and for entries whose name does not match.
    pub fn entity_for(&self, path: &Path) -> Option<PathBuf> {
        let relative = path.strip_prefix(&self.parent).ok()?;

        let first = match relative.components().next()? {
            Component::Normal(name) => name,
            _ => return None,
        };

        let first_name = first.to_string_lossy();
        if first_name == BACKUP_FOLDER_NAME || !first_name.starts_with(&self.name) {
            return None;
        }

        Some(self.parent.join(first))
    }

    /// Whether a changed path belongs to the save entity
    pub fn matches(&self, path: &Path) -> bool {
        self.entity_for(path).is_some()
    }

    /// Whether `path` is a matching entity itself rather than something inside it
    pub fn is_entity_root(&self, path: &Path) -> bool {
        self.entity_for(path).map_or(false, |entity| entity == path)
    }
}
