//! Monitor loop tests driven through a plain event channel
//!
//! Most of these run on real time with short intervals and check the wiring.
//! The full save scenario runs on paused time with minute-scale settings, and
//! one test goes through `Monitor::start` with a real file watcher.

use alarm::{AlarmSink, AlarmState, RecordingSink};
use cli_lib::{Monitor, MonitorHandle, MonitorStatus};
use keeper_core::{AlarmSound, Settings, WatchTarget, QUICKSAVE_NAME};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use watcher::{Operation, RawEvent, SourceError, SourceEvent, WatchRegistrar};

#[derive(Default)]
struct RecordingRegistrar {
    watched: Mutex<Vec<PathBuf>>,
    closes: AtomicUsize,
}

impl RecordingRegistrar {
    fn watched(&self) -> Vec<PathBuf> {
        self.watched.lock().unwrap().clone()
    }

    fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl WatchRegistrar for RecordingRegistrar {
    fn watch_dir(&self, path: &Path) -> Result<(), SourceError> {
        self.watched.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    fn close(&self) -> bool {
        self.closes.fetch_add(1, Ordering::SeqCst) == 0
    }
}

struct Harness {
    _temp: TempDir,
    target: WatchTarget,
    tx: Option<mpsc::UnboundedSender<SourceEvent>>,
    sink: Arc<RecordingSink>,
    registrar: Arc<RecordingRegistrar>,
    handle: MonitorHandle,
    task: JoinHandle<MonitorStatus>,
}

impl Harness {
    fn start(settings: Settings) -> Self {
        let temp = TempDir::new().unwrap();
        let target = WatchTarget::quicksave(temp.path());
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Arc::new(RecordingSink::new());
        let registrar = Arc::new(RecordingRegistrar::default());

        let dyn_sink: Arc<dyn AlarmSink> = sink.clone();
        let (monitor, handle) =
            Monitor::new(target.clone(), &settings, dyn_sink, registrar.clone(), rx);
        let task = tokio::spawn(monitor.run());

        Self {
            _temp: temp,
            target,
            tx: Some(tx),
            sink,
            registrar,
            handle,
            task,
        }
    }

    /// Write the quicksave folder to disk
    fn write_save(&self) -> PathBuf {
        let dir = self.target.path();
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("quicksave.sav");
        std::fs::write(&file, b"save data").unwrap();
        file
    }

    fn send(&self, path: &Path, operation: Operation) {
        let event = SourceEvent::Raw(RawEvent::new(path, operation));
        self.tx.as_ref().unwrap().send(event).unwrap();
    }

    fn backups(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(self.target.backups_dir()) {
            Ok(entries) => entries.flatten().map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    async fn wait_for(&self, what: &str, done: impl Fn(&MonitorStatus) -> bool) -> MonitorStatus {
        wait_with_timeout(&self.handle, what, done).await
    }

    async fn stop(self) -> (MonitorStatus, Arc<RecordingRegistrar>, Arc<RecordingSink>) {
        self.handle.shutdown();
        let status = self.task.await.unwrap();
        (status, self.registrar, self.sink)
    }
}

/// Wait for a status change without arming any timer of our own
///
/// Under paused time a pending timeout would let the clock jump ahead while a
/// backup runs on the blocking pool.
async fn status_until(
    handle: &MonitorHandle,
    done: impl Fn(&MonitorStatus) -> bool,
) -> MonitorStatus {
    let mut rx = handle.subscribe();
    loop {
        {
            let status = rx.borrow_and_update();
            if done(&*status) {
                return (*status).clone();
            }
        }
        if rx.changed().await.is_err() {
            return rx.borrow().clone();
        }
    }
}

async fn wait_with_timeout(
    handle: &MonitorHandle,
    what: &str,
    done: impl Fn(&MonitorStatus) -> bool,
) -> MonitorStatus {
    match tokio::time::timeout(Duration::from_secs(10), status_until(handle, done)).await {
        Ok(status) => status,
        Err(_) => panic!("timed out waiting for {}: {:?}", what, handle.status()),
    }
}

/// `actual` is at `expected` or within one timer tick after it
fn assert_near(actual: Instant, expected: Instant, what: &str) {
    assert!(
        actual >= expected && actual - expected <= Duration::from_millis(20),
        "{}: off by {:?}",
        what,
        actual.saturating_duration_since(expected)
    );
}

fn settings(debounce_ms: u64, alarm_ms: u64, repeat_ms: u64, volume: u8) -> Settings {
    Settings {
        alarm_interval: Duration::from_millis(alarm_ms),
        debounce_delay: Duration::from_millis(debounce_ms),
        repeat_interval: Duration::from_millis(repeat_ms),
        alarm_volume: volume,
        alarm_sound: if volume == 0 {
            AlarmSound::Muted
        } else {
            AlarmSound::Beep
        },
        verbose_logging: false,
    }
}

#[tokio::test]
async fn test_burst_produces_one_backup() {
    let harness = Harness::start(settings(80, 60_000, 60_000, 100));
    let file = harness.write_save();

    for _ in 0..5 {
        harness.send(&file, Operation::Modified);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let status = harness
        .wait_for("first backup", |s| s.backups_created == 1)
        .await;
    assert_eq!(status.alarm_state, AlarmState::Armed);
    assert!(!status.pending_save);

    let record = status.last_backup.unwrap();
    assert_eq!(record.source, harness.target.path());
    assert_eq!(record.files_copied, 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(harness.handle.status().backups_created, 1);
    assert_eq!(harness.backups().len(), 1);

    harness.stop().await;
}

#[tokio::test]
async fn test_save_removed_before_settling_is_skipped() {
    let harness = Harness::start(settings(100, 60_000, 60_000, 100));
    let file = harness.write_save();

    harness.send(&file, Operation::Created);
    std::fs::remove_dir_all(harness.target.path()).unwrap();
    harness.send(&file, Operation::Removed);

    tokio::time::sleep(Duration::from_millis(300)).await;

    let status = harness.handle.status();
    assert_eq!(status.backups_created, 0);
    assert_eq!(status.backup_failures, 0);
    assert_eq!(status.alarm_state, AlarmState::Idle);
    assert!(harness.backups().is_empty());

    harness.stop().await;
}

#[tokio::test]
async fn test_unrelated_paths_are_ignored() {
    let harness = Harness::start(settings(30, 60_000, 60_000, 100));
    let other = harness.target.parent().join("000001 - autosave");
    std::fs::create_dir_all(&other).unwrap();

    harness.send(&other.join("a.sav"), Operation::Modified);
    harness.send(&harness.target.backups_dir().join("x"), Operation::Created);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(harness.handle.status().backups_created, 0);

    harness.stop().await;
}

#[tokio::test]
async fn test_alarm_fires_then_repeats() {
    let harness = Harness::start(settings(20, 150, 80, 70));
    let file = harness.write_save();
    harness.send(&file, Operation::Modified);

    harness.wait_for("backup", |s| s.backups_created == 1).await;
    let status = harness
        .wait_for("repeated alarms", |s| s.alarms_fired >= 4)
        .await;
    assert_eq!(status.alarm_state, AlarmState::Repeating);

    let (_, _, sink) = harness.stop().await;
    let plays = sink.plays();
    assert!(plays.len() >= 3, "only {} plays", plays.len());
    assert!(plays.iter().all(|(_, volume)| *volume == 70));
}

#[tokio::test]
async fn test_save_stops_repeating_alarm() {
    let harness = Harness::start(settings(20, 100, 60_000, 100));
    let file = harness.write_save();
    harness.send(&file, Operation::Modified);

    harness
        .wait_for("first alarm", |s| s.alarm_state == AlarmState::Repeating)
        .await;

    harness.send(&file, Operation::Modified);
    let status = harness
        .wait_for("second backup", |s| s.backups_created == 2)
        .await;

    assert_eq!(status.alarm_state, AlarmState::Armed);
    assert_eq!(status.alarms_fired, 1);

    harness.stop().await;
}

#[tokio::test]
async fn test_muted_alarm_never_plays() {
    let harness = Harness::start(settings(20, 60, 40, 0));
    let file = harness.write_save();
    harness.send(&file, Operation::Modified);

    harness.wait_for("alarms", |s| s.alarms_fired >= 3).await;

    let (status, _, sink) = harness.stop().await;
    assert!(status.alarms_fired >= 3);
    assert_eq!(sink.count(), 0);
}

#[tokio::test]
async fn test_created_save_folder_is_added_to_watch() {
    let harness = Harness::start(settings(50, 60_000, 60_000, 100));
    std::fs::create_dir_all(harness.target.path()).unwrap();

    harness.send(&harness.target.path(), Operation::Created);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.registrar.watched(), vec![harness.target.path()]);

    // Folder creation alone is not a save
    assert_eq!(harness.handle.status().backups_created, 0);

    harness.stop().await;
}

#[tokio::test]
async fn test_failed_backup_leaves_alarm_idle() {
    let harness = Harness::start(settings(20, 60_000, 60_000, 100));
    let file = harness.write_save();

    // A plain file where the backups folder should go
    std::fs::write(harness.target.backups_dir(), b"in the way").unwrap();

    harness.send(&file, Operation::Modified);
    let status = harness
        .wait_for("backup failure", |s| s.backup_failures == 1)
        .await;

    assert_eq!(status.backups_created, 0);
    assert_eq!(status.alarm_state, AlarmState::Idle);

    harness.stop().await;
}

#[tokio::test]
async fn test_shutdown_is_idempotent_and_closes_once() {
    let harness = Harness::start(settings(20, 60_000, 60_000, 100));
    let file = harness.write_save();
    harness.send(&file, Operation::Modified);
    harness.wait_for("backup", |s| s.backups_created == 1).await;

    harness.handle.shutdown();
    harness.handle.shutdown();

    let handle = harness.handle.clone();
    let (status, registrar, _) = harness.stop().await;
    handle.shutdown();

    assert!(!status.running);
    assert_eq!(status.alarm_state, AlarmState::Idle);
    assert_eq!(registrar.closes(), 1);
    assert!(!handle.status().running);
}

#[tokio::test]
async fn test_event_stream_end_stops_monitor() {
    let mut harness = Harness::start(settings(20, 60_000, 60_000, 100));
    let file = harness.write_save();
    harness.send(&file, Operation::Modified);
    harness.wait_for("backup", |s| s.backups_created == 1).await;

    drop(harness.tx.take());

    let status = tokio::time::timeout(Duration::from_secs(5), &mut harness.task)
        .await
        .expect("monitor did not stop")
        .unwrap();

    assert!(!status.running);
    assert_eq!(status.alarm_state, AlarmState::Idle);
    assert_eq!(harness.registrar.closes(), 1);
}

#[tokio::test]
async fn test_watcher_errors_do_not_stop_monitor() {
    let harness = Harness::start(settings(20, 60_000, 60_000, 100));
    harness
        .tx
        .as_ref()
        .unwrap()
        .send(SourceEvent::Error("queue overflow".to_string()))
        .unwrap();

    let file = harness.write_save();
    harness.send(&file, Operation::Modified);

    let status = harness.wait_for("backup", |s| s.backups_created == 1).await;
    assert!(status.running);

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_save_scenario_on_paused_time() {
    const MIN: Duration = Duration::from_secs(60);
    let debounce = Duration::from_secs(3);

    let mut harness = Harness::start(Settings {
        alarm_interval: 5 * MIN,
        debounce_delay: debounce,
        repeat_interval: 5 * MIN,
        alarm_volume: 100,
        alarm_sound: AlarmSound::Beep,
        verbose_logging: false,
    });
    let t0 = Instant::now();
    let file = harness.write_save();

    // Save at t=0, backed up once the 3s window settles
    harness.send(&file, Operation::Created);
    let status = status_until(&harness.handle, |s| s.backups_created == 1).await;
    assert_eq!(status.alarm_state, AlarmState::Armed);
    assert_near(Instant::now(), t0 + debounce, "first backup");

    // Another save at t=4m restarts the alarm before it is due at 5m3s
    tokio::time::sleep_until(t0 + 4 * MIN).await;
    assert_eq!(harness.handle.status().alarms_fired, 0);
    harness.send(&file, Operation::Modified);
    let status = status_until(&harness.handle, |s| s.backups_created == 2).await;
    assert_eq!(status.alarm_state, AlarmState::Armed);
    assert_eq!(status.alarms_fired, 0);

    let status = status_until(&harness.handle, |s| s.alarms_fired == 3).await;
    assert_eq!(status.alarm_state, AlarmState::Repeating);
    assert_eq!(status.backups_created, 2);

    drop(harness.tx.take());
    let status = (&mut harness.task).await.unwrap();
    assert!(!status.running);
    assert_eq!(status.alarms_fired, 3);

    let plays = harness.sink.plays();
    assert_eq!(plays.len(), 3, "{:?}", plays);

    let first_alarm = t0 + 4 * MIN + debounce + 5 * MIN;
    for (n, (at, volume)) in plays.iter().enumerate() {
        assert_near(*at, first_alarm + 5 * MIN * n as u32, &format!("alarm {}", n + 1));
        assert_eq!(*volume, 100);
    }
}

#[tokio::test]
async fn test_start_with_real_watcher_backs_up_save() {
    let temp = TempDir::new().unwrap();
    // Events carry resolved paths (e.g. /private/var on macOS)
    let saves = std::fs::canonicalize(temp.path()).unwrap();
    let target = WatchTarget::quicksave(&saves);
    std::fs::create_dir_all(target.path()).unwrap();

    let sink = Arc::new(RecordingSink::new());
    let dyn_sink: Arc<dyn AlarmSink> = sink.clone();
    let (monitor, handle) =
        Monitor::start(target.clone(), &settings(100, 60_000, 60_000, 100), dyn_sink).unwrap();
    assert!(target.backups_dir().is_dir());

    let task = tokio::spawn(monitor.run());

    // Give the OS watch a moment to settle before writing
    tokio::time::sleep(Duration::from_millis(100)).await;
    std::fs::write(target.path().join("quicksave.sav"), b"save data").unwrap();

    let status = wait_with_timeout(&handle, "backup from real events", |s| {
        s.backups_created >= 1
    })
    .await;

    let record = status.last_backup.unwrap();
    assert_eq!(record.source, target.path());
    assert!(record.destination.join("quicksave.sav").is_file());
    assert!(record
        .destination
        .file_name()
        .unwrap()
        .to_string_lossy()
        .ends_with(QUICKSAVE_NAME));

    handle.shutdown();
    let status = task.await.unwrap();
    assert!(!status.running);
    assert_eq!(sink.count(), 0);
}
