//! The save watcher event loop
//!
//! [`Monitor`] owns every piece of mutable state: the debounce window, the
//! alarm state machine and the event stream. One task runs [`Monitor::run`],
//! which selects over shutdown requests, raw events, the debounce deadline
//! and the alarm deadline. Because timer expiry is just another `select!`
//! branch, a timer can never race a save: whichever comes first is handled
//! to completion before the other is looked at.
//!
//! Backups run on the blocking pool and are awaited. Alarm playback is
//! spawned and never awaited, so a long sound cannot delay a save, and a
//! save that lands during playback still cancels the next alarm.

use alarm::{AlarmScheduler, AlarmSettings, AlarmSink, AlarmState};
use anyhow::{Context, Result};
use backup::{BackupMaterializer, BackupRecord};
use keeper_core::{Settings, WatchTarget};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use watcher::{Debouncer, Decision, EventSource, RawEvent, SourceEvent, WatchRegistrar};

/// Snapshot of the monitor, published after every step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorStatus {
    pub running: bool,
    pub alarm_state: AlarmState,
    /// A debounce window is open
    pub pending_save: bool,
    pub backups_created: usize,
    pub backup_failures: usize,
    pub alarms_fired: usize,
    pub last_backup: Option<BackupRecord>,
}

impl Default for MonitorStatus {
    fn default() -> Self {
        Self {
            running: true,
            alarm_state: AlarmState::Idle,
            pending_save: false,
            backups_created: 0,
            backup_failures: 0,
            alarms_fired: 0,
            last_backup: None,
        }
    }
}

/// Control side of a running [`Monitor`]
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    shutdown_tx: Arc<watch::Sender<bool>>,
    status_rx: watch::Receiver<MonitorStatus>,
}

impl MonitorHandle {
    /// Ask the monitor to stop. Safe to call any number of times.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Latest published status
    pub fn status(&self) -> MonitorStatus {
        self.status_rx.borrow().clone()
    }

    /// Receiver that is notified whenever the status changes
    pub fn subscribe(&self) -> watch::Receiver<MonitorStatus> {
        self.status_rx.clone()
    }
}

/// Save watcher: debounce → backup → alarm reset, plus the alarm timer
pub struct Monitor {
    debouncer: Debouncer,
    alarm: AlarmScheduler,
    materializer: BackupMaterializer,
    sink: Arc<dyn AlarmSink>,
    registrar: Arc<dyn WatchRegistrar>,
    events: mpsc::UnboundedReceiver<SourceEvent>,
    shutdown_rx: watch::Receiver<bool>,
    status_tx: watch::Sender<MonitorStatus>,
    status: MonitorStatus,
}

impl Monitor {
    /// Assemble a monitor around an existing event stream
    pub fn new(
        target: WatchTarget,
        settings: &Settings,
        sink: Arc<dyn AlarmSink>,
        registrar: Arc<dyn WatchRegistrar>,
        events: mpsc::UnboundedReceiver<SourceEvent>,
    ) -> (Self, MonitorHandle) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let status = MonitorStatus::default();
        let (status_tx, status_rx) = watch::channel(status.clone());

        let monitor = Self {
            materializer: BackupMaterializer::new(target.backups_dir()),
            debouncer: Debouncer::new(target, settings.debounce_delay),
            alarm: AlarmScheduler::new(AlarmSettings::from(settings)),
            sink,
            registrar,
            events,
            shutdown_rx,
            status_tx,
            status,
        };

        let handle = MonitorHandle {
            shutdown_tx: Arc::new(shutdown_tx),
            status_rx,
        };

        (monitor, handle)
    }

    /// Check startup preconditions, open the OS watch and build the monitor
    ///
    /// Fails if the saves directory is missing, the backups directory cannot
    /// be created, or the file watcher cannot be started.
    pub fn start(
        target: WatchTarget,
        settings: &Settings,
        sink: Arc<dyn AlarmSink>,
    ) -> Result<(Self, MonitorHandle)> {
        if !target.parent().is_dir() {
            anyhow::bail!("Saves folder does not exist: {}", target.parent().display());
        }

        BackupMaterializer::new(target.backups_dir())
            .ensure_dir()
            .context("Failed to create backups folder")?;

        let (source, events) =
            EventSource::new(target.parent()).context("Failed to create file watcher")?;
        let source = Arc::new(source);

        watch_existing_saves(&target, source.as_ref());

        Ok(Self::new(target, settings, sink, source, events))
    }

    /// Run until shutdown is requested or the event stream ends
    ///
    /// Returns the final status. On return all timers are cancelled and the
    /// event source has been closed.
    pub async fn run(mut self) -> MonitorStatus {
        let mut shutdown_rx = self.shutdown_rx.clone();
        self.publish();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let debounce_at = self.debouncer.deadline();
            let alarm_at = self.alarm.deadline();

            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    // A dropped handle can never ask again, treat it as a request
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }

                event = self.events.recv() => match event {
                    Some(SourceEvent::Raw(raw)) => self.handle_raw_event(raw),
                    Some(SourceEvent::Error(e)) => warn!("Watcher error: {}", e),
                    None => {
                        warn!("File event stream ended, shutting down");
                        break;
                    }
                },

                _ = sleep_until(debounce_at) => self.handle_debounce_expiry().await,

                _ = sleep_until(alarm_at) => self.handle_alarm_expiry(),
            }

            self.publish();
        }

        self.finish()
    }

    fn handle_raw_event(&mut self, raw: RawEvent) {
        debug!("File event detected: {} ({:?})", raw.path.display(), raw.operation);

        if let Decision::RegisterDirectory(dir) = self.debouncer.on_raw_event(&raw) {
            info!("Quicksave folder created, adding to watcher...");
            if let Err(e) = self.registrar.watch_dir(&dir) {
                warn!("Failed to add quicksave folder to watcher: {}", e);
            }
        }
    }

    async fn handle_debounce_expiry(&mut self) {
        let candidate = match self.debouncer.take_expired(Instant::now()) {
            Some(candidate) => candidate,
            None => return,
        };

        info!("Processing save: {}", candidate.path.display());

        let materializer = self.materializer.clone();
        let path = candidate.path.clone();
        let result = tokio::task::spawn_blocking(move || materializer.backup(&path)).await;

        match result {
            Ok(Ok(record)) => {
                self.status.backups_created += 1;
                self.status.last_backup = Some(record);
                self.alarm.confirm_save(Instant::now());
                info!("Save processed successfully. Alarm timer reset.");
            }
            Ok(Err(e)) => {
                self.status.backup_failures += 1;
                error!("Error creating backup: {}", e);
            }
            Err(e) => {
                self.status.backup_failures += 1;
                error!("Backup task failed: {}", e);
            }
        }
    }

    fn handle_alarm_expiry(&mut self) {
        let firing = match self.alarm.on_timer(Instant::now()) {
            Some(firing) => firing,
            None => return,
        };

        self.status.alarms_fired += 1;

        if firing.audible() {
            let sink = Arc::clone(&self.sink);
            tokio::spawn(async move {
                sink.play(firing.volume).await;
            });
        }
    }

    fn publish(&mut self) {
        self.status.alarm_state = self.alarm.state();
        self.status.pending_save = self.debouncer.pending().is_some();
        self.status_tx.send_replace(self.status.clone());
    }

    fn finish(mut self) -> MonitorStatus {
        self.alarm.shutdown();
        self.debouncer.cancel();
        self.events.close();

        if self.registrar.close() {
            info!("File watcher closed");
        }

        self.status.running = false;
        self.publish();
        self.status
    }
}

/// Add every existing save folder to the watch
fn watch_existing_saves(target: &WatchTarget, registrar: &dyn WatchRegistrar) {
    let entries = match std::fs::read_dir(target.parent()) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Could not read folder contents: {}", e);
            return;
        }
    };

    let mut found = false;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() || !target.is_entity_root(&path) {
            continue;
        }

        found = true;
        match registrar.watch_dir(&path) {
            Ok(()) => info!("Watching quicksave folder for changes: {}", path.display()),
            Err(e) => warn!("Failed to add quicksave folder to watcher: {}", e),
        }
    }

    if !found {
        warn!(
            "Quicksave folder does not exist yet: {}. Monitoring starts once it is created.",
            target.path().display()
        );
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
