//! Debouncing of save events
//!
//! A game writes a save as a burst of creates and writes. The [`Debouncer`]
//! keeps at most one open window ([`PendingSave`]); every qualifying event
//! pushes the window's deadline to `event time + delay`. When the deadline
//! passes without another event, [`Debouncer::take_expired`] yields exactly
//! one [`SaveCandidate`].
//!
//! The debouncer owns no timer. Its owner sleeps until [`Debouncer::deadline`]
//! and then calls `take_expired`, which keeps all state changes on the
//! owner's task.

use crate::source::{Operation, RawEvent};
use keeper_core::WatchTarget;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// The single open debounce window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSave {
    /// Entity to back up when the window closes
    pub path: PathBuf,
    /// When the window closes
    pub fire_at: Instant,
}

/// A save that stayed quiet for the whole debounce delay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveCandidate {
    pub path: PathBuf,
    /// Last qualifying event time plus the debounce delay
    pub settled_at: Instant,
}

/// What the debouncer did with an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Unrelated path, removal, or otherwise not a save
    Ignored,
    /// The save folder itself was just created; the caller should add it
    /// to the watch so changes inside it are reported
    RegisterDirectory(PathBuf),
    /// A debounce window is open (new or restarted)
    Scheduled { path: PathBuf, fire_at: Instant },
}

/// Coalesces bursts of events on the watch target
#[derive(Debug)]
pub struct Debouncer {
    target: WatchTarget,
    delay: Duration,
    pending: Option<PendingSave>,
}

impl Debouncer {
    pub fn new(target: WatchTarget, delay: Duration) -> Self {
        Self {
            target,
            delay,
            pending: None,
        }
    }

    /// The open window, if any
    pub fn pending(&self) -> Option<&PendingSave> {
        self.pending.as_ref()
    }

    /// When the open window closes
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.fire_at)
    }

    /// Feed one raw event
    pub fn on_raw_event(&mut self, event: &RawEvent) -> Decision {
        let entity = match self.target.entity_for(&event.path) {
            Some(entity) => entity,
            None => {
                debug!("Ignored (not the save): {}", event.path.display());
                return Decision::Ignored;
            }
        };

        match event.operation {
            Operation::Removed => Decision::Ignored,
            Operation::Created if event.path == entity && entity.is_dir() => {
                debug!("Save folder created: {}", entity.display());
                Decision::RegisterDirectory(entity)
            }
            Operation::Created | Operation::Modified => {
                let Some(fire_at) = event.timestamp.checked_add(self.delay) else {
                    warn!("Debounce delay {:?} is out of range, ignoring event", self.delay);
                    return Decision::Ignored;
                };
                let restarted = self
                    .pending
                    .replace(PendingSave {
                        path: entity.clone(),
                        fire_at,
                    })
                    .is_some();

                if restarted {
                    debug!("Save still changing, restarting {:?} debounce", self.delay);
                } else {
                    debug!(
                        "Detected change in {}, waiting {:?} before processing",
                        entity.display(),
                        self.delay
                    );
                }

                Decision::Scheduled {
                    path: entity,
                    fire_at,
                }
            }
        }
    }

    /// Close the window if its deadline has passed
    ///
    /// Returns `None` when nothing is due, and also when the window closed
    /// but the save no longer exists on disk (a transient or deleted save).
    pub fn take_expired(&mut self, now: Instant) -> Option<SaveCandidate> {
        if self.deadline()? > now {
            return None;
        }

        let pending = self.pending.take()?;
        if !pending.path.exists() {
            debug!(
                "Save no longer exists, skipping backup: {}",
                pending.path.display()
            );
            return None;
        }

        Some(SaveCandidate {
            path: pending.path,
            settled_at: pending.fire_at,
        })
    }

    /// Drop the open window; returns whether there was one
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }
}
