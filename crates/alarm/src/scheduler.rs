//! Alarm scheduling state machine
//!
//! # State Machine
//!
//! ```text
//!            confirm_save            alarm_interval elapsed
//!  Idle ─────────────────► Armed ─────────────────────────► Repeating ──┐
//!                            ▲                                  │  ▲     │ repeat_interval
//!                            │         confirm_save             │  └─────┘ elapsed
//!                            └──────────────────────────────────┘
//!
//!  any state ── shutdown ──► Idle (terminal)
//! ```
//!
//! The scheduler keeps a single deadline, so the one-shot and the repeating
//! timer can never both be live. It owns no timer: the owner sleeps until
//! [`AlarmScheduler::deadline`] and calls [`AlarmScheduler::on_timer`]. Any
//! state change therefore happens on the owner's task, and a
//! `confirm_save` handled before the deadline cancels that firing outright.

use keeper_core::Settings;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Where the reminder is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmState {
    /// No timer running (startup, or after shutdown)
    Idle,
    /// Waiting for the first alarm after a save
    Armed,
    /// First alarm fired; repeating until the next save
    Repeating,
}

/// Timing and volume for the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmSettings {
    pub alarm_interval: Duration,
    pub repeat_interval: Duration,
    /// 0 mutes the alarm without stopping the schedule
    pub volume: u8,
}

impl From<&Settings> for AlarmSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            alarm_interval: settings.alarm_interval,
            repeat_interval: settings.repeat_interval,
            volume: settings.alarm_volume,
        }
    }
}

/// An alarm that is due now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmFiring {
    /// 1 for the first alarm after a save, 2 for the first repeat, ...
    pub sequence: u32,
    /// Deadline that elapsed
    pub scheduled_at: Instant,
    /// Time since the last confirmed save
    pub since_save: Duration,
    pub volume: u8,
}

impl AlarmFiring {
    /// Whether the sink should be invoked for this firing
    pub fn audible(&self) -> bool {
        self.volume > 0
    }
}

/// The reminder state machine
#[derive(Debug)]
pub struct AlarmScheduler {
    settings: AlarmSettings,
    state: AlarmState,
    next_fire: Option<Instant>,
    last_save: Option<Instant>,
    fired_since_save: u32,
    shut_down: bool,
}

impl AlarmScheduler {
    pub fn new(settings: AlarmSettings) -> Self {
        Self {
            settings,
            state: AlarmState::Idle,
            next_fire: None,
            last_save: None,
            fired_since_save: 0,
            shut_down: false,
        }
    }

    pub fn settings(&self) -> &AlarmSettings {
        &self.settings
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    /// When the next alarm is due
    pub fn deadline(&self) -> Option<Instant> {
        self.next_fire
    }

    /// When the last save was confirmed
    pub fn last_save(&self) -> Option<Instant> {
        self.last_save
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// A save was backed up: cancel whatever is pending and re-arm
    ///
    /// Returns when the next alarm is due, or `None` after shutdown.
    pub fn confirm_save(&mut self, now: Instant) -> Option<Instant> {
        if self.shut_down {
            warn!("Save confirmed after shutdown; alarm stays idle");
            return None;
        }

        if self.state == AlarmState::Repeating {
            debug!("Stopping repeat alarm");
        }

        self.state = AlarmState::Armed;
        self.last_save = Some(now);
        self.fired_since_save = 0;
        self.next_fire = now.checked_add(self.settings.alarm_interval);

        match self.next_fire {
            Some(_) => info!(
                "Alarm timer started. Will alert in {:?} if no new save is made.",
                self.settings.alarm_interval
            ),
            None => warn!(
                "Alarm interval {:?} is out of range; no alarm will fire",
                self.settings.alarm_interval
            ),
        }

        self.next_fire
    }

    /// Fire the alarm if its deadline has passed
    ///
    /// The next deadline is kept on the fixed repeat grid
    /// (`previous deadline + repeat_interval`). If the owner fell so far
    /// behind that the grid point is already past, the schedule restarts
    /// from `now` instead of firing a burst of catch-up alarms.
    pub fn on_timer(&mut self, now: Instant) -> Option<AlarmFiring> {
        let due = self.next_fire.filter(|at| *at <= now)?;

        if self.state == AlarmState::Idle {
            self.next_fire = None;
            return None;
        }

        let repeat = self.settings.repeat_interval;
        let next = due
            .checked_add(repeat)
            .filter(|next| *next > now)
            .or_else(|| now.checked_add(repeat));
        if next.is_none() {
            warn!("Repeat interval {:?} is out of range; alarm will not repeat", repeat);
        }

        self.state = AlarmState::Repeating;
        self.next_fire = next;
        self.fired_since_save += 1;

        let since_save = self
            .last_save
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or_default();

        warn!(
            "*** ALARM: Time to save! It's been {:?} since last save. ***",
            since_save
        );

        let firing = AlarmFiring {
            sequence: self.fired_since_save,
            scheduled_at: due,
            since_save,
            volume: self.settings.volume,
        };

        if !firing.audible() {
            debug!("Alarm volume is 0, alarm is muted");
        }

        Some(firing)
    }

    /// Cancel all timers and go idle for good
    ///
    /// Returns `false` if already shut down.
    pub fn shutdown(&mut self) -> bool {
        let first = !self.shut_down;
        self.shut_down = true;
        self.state = AlarmState::Idle;
        self.next_fire = None;
        first
    }
}
