//! Turns sequences into a resolved, non-overlapping timeline.
//!
//! `merge` yields occurrences from every sequence in start order,
//! `window` bounds that stream, and `resolve` partitions the bounded
//! batch so the most recently updated occurrence owns each instant.

mod merge;
mod resolve;
mod window;

pub use merge::{
    RecurrenceIterator, ScheduledOccurrence, StartKey, compare_start, current_or_next_start,
};
pub use resolve::resolve_overrides;
pub use window::{TimelineWindow, collect_window, resolve_timeline};
