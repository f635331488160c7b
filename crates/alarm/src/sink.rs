//! Alarm playback
//!
//! The scheduler only decides *when* to alarm. [`AlarmSink`] is how the
//! alarm is heard. [`SoundSink`] is the desktop implementation: a console
//! beep, an audio file played through the platform's command-line player,
//! or nothing at all. Playback failures are logged and never propagate.

use async_trait::async_trait;
use keeper_core::AlarmSound;
use parking_lot::Mutex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Below this volume the system beep (which has no volume control) is skipped
const MIN_BEEP_VOLUME: u8 = 10;

/// Something that can play the alarm
#[async_trait]
pub trait AlarmSink: Send + Sync {
    /// Play the alarm once at `volume` (1-100)
    async fn play(&self, volume: u8);
}

/// Alarm played through the desktop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoundSink {
    Muted,
    Beep,
    PlayFile(PathBuf),
}

impl From<&AlarmSound> for SoundSink {
    fn from(sound: &AlarmSound) -> Self {
        match sound {
            AlarmSound::Muted => SoundSink::Muted,
            AlarmSound::Beep => SoundSink::Beep,
            AlarmSound::File(path) => SoundSink::PlayFile(path.clone()),
        }
    }
}

#[async_trait]
impl AlarmSink for SoundSink {
    async fn play(&self, volume: u8) {
        match self {
            SoundSink::Muted => debug!("Alarm is muted"),
            SoundSink::Beep => beep(volume).await,
            SoundSink::PlayFile(path) => {
                if path.is_file() {
                    play_file(path, volume).await;
                } else {
                    warn!(
                        "Audio file not found: {}, using system beep instead",
                        path.display()
                    );
                    beep(volume).await;
                }
            }
        }
    }
}

/// Sink that only remembers when it was asked to play
#[derive(Debug, Default)]
pub struct RecordingSink {
    plays: Mutex<Vec<(Instant, u8)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// (time, volume) of every play so far
    pub fn plays(&self) -> Vec<(Instant, u8)> {
        self.plays.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.plays.lock().len()
    }
}

#[async_trait]
impl AlarmSink for RecordingSink {
    async fn play(&self, volume: u8) {
        self.plays.lock().push((Instant::now(), volume));
    }
}

async fn beep(volume: u8) {
    if volume < MIN_BEEP_VOLUME {
        debug!("Volume {} too low for system beep, skipping", volume);
        return;
    }

    if cfg!(windows) {
        let script = "[console]::beep(800, 500)";
        if run("powershell", &["-Command", script]).await.is_ok() {
            return;
        }
    }

    console_bell();
}

fn console_bell() {
    let mut stdout = std::io::stdout();
    let _ = stdout.write_all(b"\x07");
    let _ = stdout.flush();
}

async fn play_file(path: &Path, volume: u8) {
    let file = path.to_string_lossy();

    let result = if cfg!(windows) {
        play_file_windows(path, volume).await
    } else if cfg!(target_os = "macos") {
        // afplay volume is 0.0-1.0
        let level = format!("{:.2}", f32::from(volume) / 100.0);
        run("afplay", &["-v", level.as_str(), &*file]).await
    } else {
        // paplay volume is 0-65536; aplay has no volume control
        let level = format!("--volume={}", u32::from(volume) * 65536 / 100);
        match run("paplay", &[level.as_str(), &*file]).await {
            Ok(()) => Ok(()),
            Err(_) => run("aplay", &["-q", &*file]).await,
        }
    };

    if let Err(e) = result {
        warn!("Error playing audio file {}: {}", path.display(), e);
    }
}

async fn play_file_windows(path: &Path, volume: u8) -> Result<(), String> {
    let abs = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let escaped = abs
        .to_string_lossy()
        .replace('\\', "\\\\")
        .replace('"', "\\\"");

    let script = format!(
        r#"
$player = New-Object -ComObject WMPlayer.OCX
$player.settings.volume = {volume}
$player.URL = "{escaped}"
$player.controls.play()
while ($player.playState -eq 3) {{
    Start-Sleep -Milliseconds 100
}}
$player.controls.stop()
$player.close()
"#
    );

    if run("powershell", &["-Command", script.as_str()]).await.is_ok() {
        return Ok(());
    }

    // No volume control from here on
    let is_wav = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("wav"));
    if is_wav {
        let script = format!(r#"[System.Media.SoundPlayer]::new("{escaped}").PlaySync()"#);
        run("powershell", &["-Command", script.as_str()]).await
    } else {
        let file = path.to_string_lossy();
        run("cmd", &["/C", "start", "/MIN", &*file]).await
    }
}

/// Run a player command to completion
async fn run(program: &str, args: &[&str]) -> Result<(), String> {
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| format!("{}: {}", program, e))?;

    if status.success() {
        Ok(())
    } else {
        Err(format!("{} exited with {}", program, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_from_sound() {
        assert_eq!(SoundSink::from(&AlarmSound::Muted), SoundSink::Muted);
        assert_eq!(SoundSink::from(&AlarmSound::Beep), SoundSink::Beep);
        assert_eq!(
            SoundSink::from(&AlarmSound::File(PathBuf::from("/tmp/a.wav"))),
            SoundSink::PlayFile(PathBuf::from("/tmp/a.wav"))
        );
    }

    #[tokio::test]
    async fn test_recording_sink() {
        let sink = RecordingSink::new();
        sink.play(40).await;
        sink.play(100).await;

        let plays = sink.plays();
        assert_eq!(sink.count(), 2);
        assert_eq!(plays[0].1, 40);
        assert_eq!(plays[1].1, 100);
    }

    #[tokio::test]
    async fn test_muted_and_quiet_beep_do_nothing() {
        // Neither spawns a process nor fails
        SoundSink::Muted.play(100).await;
        SoundSink::Beep.play(MIN_BEEP_VOLUME - 1).await;
    }

    #[tokio::test]
    async fn test_missing_player_is_reported_not_fatal() {
        let result = run("savekeeper-no-such-player", &["x"]).await;
        assert!(result.is_err());
    }
}
