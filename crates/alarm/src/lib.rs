//! Save reminder alarm
//!
//! - [`scheduler`]: the Idle → Armed → Repeating state machine
//! - [`sink`]: how an alarm is actually played (beep, audio file, muted)

pub mod scheduler;
pub mod sink;

pub use scheduler::{AlarmFiring, AlarmScheduler, AlarmSettings, AlarmState};
pub use sink::{AlarmSink, RecordingSink, SoundSink};
