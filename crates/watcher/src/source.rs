//! Raw file events from the OS
//!
//! [`EventSource`] owns a `notify` watcher and forwards every notification
//! into an unbounded tokio channel. Watch errors travel on the same channel
//! as [`SourceEvent::Error`] so the consumer can log them without the stream
//! ending. The stream ends only when the source is closed or dropped.

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Kind of change reported for a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Created,
    Modified,
    Removed,
}

/// A single change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Path that changed
    pub path: PathBuf,
    /// Type of change
    pub operation: Operation,
    /// When the change was observed
    pub timestamp: Instant,
}

impl RawEvent {
    /// Create an event stamped with the current time
    pub fn new(path: impl Into<PathBuf>, operation: Operation) -> Self {
        Self::at(path, operation, Instant::now())
    }

    /// Create an event with an explicit timestamp
    pub fn at(path: impl Into<PathBuf>, operation: Operation, timestamp: Instant) -> Self {
        Self {
            path: path.into(),
            operation,
            timestamp,
        }
    }
}

/// Item delivered on the event channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    Raw(RawEvent),
    /// Error reported by the underlying watch primitive
    Error(String),
}

/// Errors creating or extending a watch
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to create file watcher: {0}")]
    Create(#[source] notify::Error),

    #[error("failed to watch {}: {source}", path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("event source is closed")]
    Closed,
}

/// Something that can add directories to a live watch
///
/// Implemented by [`EventSource`]; tests substitute a recorder.
pub trait WatchRegistrar: Send + Sync {
    /// Watch `path` recursively on the same event stream
    fn watch_dir(&self, path: &Path) -> Result<(), SourceError>;

    /// Stop watching; returns `false` if already closed
    fn close(&self) -> bool;
}

/// Live OS watch on one directory (plus any directories added later)
pub struct EventSource {
    /// `None` once closed. Dropping the watcher drops the channel sender.
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl EventSource {
    /// Start watching `dir` (non-recursively) and return the event stream
    pub fn new(dir: &Path) -> Result<(Self, mpsc::UnboundedReceiver<SourceEvent>), SourceError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    for raw in translate(event) {
                        if tx.send(SourceEvent::Raw(raw)).is_err() {
                            // Receiver dropped, nobody is listening anymore
                            return;
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(SourceEvent::Error(e.to_string()));
                }
            },
            notify::Config::default(),
        )
        .map_err(SourceError::Create)?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|source| SourceError::Watch {
                path: dir.to_path_buf(),
                source,
            })?;

        tracing::debug!("Watching {}", dir.display());

        Ok((
            Self {
                watcher: Mutex::new(Some(watcher)),
            },
            rx,
        ))
    }

    /// Whether the source has been closed
    pub fn is_closed(&self) -> bool {
        self.watcher.lock().is_none()
    }
}

impl WatchRegistrar for EventSource {
    fn watch_dir(&self, path: &Path) -> Result<(), SourceError> {
        let mut guard = self.watcher.lock();
        let watcher = guard.as_mut().ok_or(SourceError::Closed)?;

        watcher
            .watch(path, RecursiveMode::Recursive)
            .map_err(|source| SourceError::Watch {
                path: path.to_path_buf(),
                source,
            })?;

        tracing::debug!("Watching {} recursively", path.display());
        Ok(())
    }

    fn close(&self) -> bool {
        let closed = self.watcher.lock().take().is_some();
        if closed {
            tracing::debug!("Event source closed");
        }
        closed
    }
}

/// Convert one `notify` event into zero or more raw events
pub fn translate(event: Event) -> Vec<RawEvent> {
    let timestamp = Instant::now();

    match event.kind {
        // Rename with both sides known: old path disappears, new path appears
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter();
            let mut out = Vec::with_capacity(2);
            if let Some(from) = paths.next() {
                out.push(RawEvent::at(from, Operation::Removed, timestamp));
            }
            if let Some(to) = paths.next() {
                out.push(RawEvent::at(to, Operation::Created, timestamp));
            }
            out
        }
        kind => match operation_for(&kind) {
            Some(operation) => event
                .paths
                .into_iter()
                .map(|path| RawEvent::at(path, operation, timestamp))
                .collect(),
            None => Vec::new(),
        },
    }
}

fn operation_for(kind: &EventKind) -> Option<Operation> {
    match kind {
        EventKind::Create(_) => Some(Operation::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(Operation::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(Operation::Created),
        EventKind::Modify(_) => Some(Operation::Modified),
        EventKind::Remove(_) => Some(Operation::Removed),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
    }
}
