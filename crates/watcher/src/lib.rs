//! File system watching for Savekeeper
//!
//! This crate turns OS file notifications into save candidates:
//! - [`source`] wraps `notify` and streams [`RawEvent`]s over a channel
//! - [`debounce`] coalesces a burst of events on the save into one candidate

pub mod debounce;
pub mod source;

pub use debounce::{Debouncer, Decision, PendingSave, SaveCandidate};
pub use source::{EventSource, Operation, RawEvent, SourceError, SourceEvent, WatchRegistrar};
