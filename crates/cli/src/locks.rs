//! Single-instance lock for the watcher
//!
//! Two watchers on the same saves folder would both back up every save and
//! both sound the alarm. The lock lives in the backups folder so it is scoped
//! to one saves directory.
//!
//! On unix the `flock` on `.savekeeper.lock` is the only arbiter. A held lock
//! always belongs to a live process, and the kernel drops it when that
//! process exits, so the file itself is never removed. Unlinking it would let
//! a second watcher lock a fresh inode while the first still holds the old
//! one.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Lock file name inside the backups folder
pub const LOCK_FILE_NAME: &str = ".savekeeper.lock";

/// Held for as long as the watcher runs
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    file: File,
}

/// Lock file content
#[derive(Debug, Serialize, Deserialize)]
struct LockContent {
    pid: u32,
    started_at: String,
}

impl InstanceLock {
    /// Take the lock in `backups_dir`
    ///
    /// Fails if another watcher holds it, whatever the file contains.
    pub fn acquire(backups_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(backups_dir).context("Failed to create backups folder")?;
        let lock_path = backups_dir.join(LOCK_FILE_NAME);

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .context("Failed to open lock file")?;

        if !try_flock_exclusive(&file)? {
            // Content may still be empty if the owner has not written it yet
            let owner = Self::read_lock_content(&mut file)
                .map(|c| format!(" (pid {})", c.pid))
                .unwrap_or_default();
            anyhow::bail!(
                "Another savekeeper is already watching this folder{}",
                owner
            );
        }

        Self::write_lock_content(&mut file)?;

        Ok(Self {
            path: lock_path,
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_lock_content(file: &mut File) -> Result<()> {
        let content = LockContent {
            pid: std::process::id(),
            started_at: Utc::now().to_rfc3339(),
        };

        let serialized =
            serde_json::to_string(&content).context("Failed to serialize lock content")?;

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(serialized.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    fn read_lock_content(file: &mut File) -> Result<LockContent> {
        file.seek(SeekFrom::Start(0))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        serde_json::from_str(&contents).context("Failed to deserialize lock content")
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        // Still locked here; the flock goes away when `file` closes
        let _ = self.file.set_len(0);
    }
}

/// Try to acquire exclusive file lock (non-blocking)
#[cfg(unix)]
fn try_flock_exclusive(file: &File) -> Result<bool> {
    use nix::fcntl::{flock, FlockArg};
    use std::os::unix::io::AsRawFd;

    match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
        Ok(_) => Ok(true),
        Err(nix::errno::Errno::EWOULDBLOCK) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

// No advisory locking here; the lock file is informational only
#[cfg(not(unix))]
fn try_flock_exclusive(_file: &File) -> Result<bool> {
    Ok(true)
}
