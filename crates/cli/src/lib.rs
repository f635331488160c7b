//! Savekeeper daemon and shared CLI helpers

pub mod daemon;
pub mod locks;
pub mod logging;
pub mod util;

pub use daemon::{Monitor, MonitorHandle, MonitorStatus};
