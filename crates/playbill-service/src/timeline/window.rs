use chrono::{DateTime, Utc};
use playbill_core::config::TimelineConfig;
use playbill_core::model::{Occurrence, Sequence};
use playbill_rfc::rfc::recur::TimeZoneResolver;

use super::merge::{RecurrenceIterator, ScheduledOccurrence};
use super::resolve::resolve_overrides;
use crate::error::{ServiceError, ServiceResult};

/// Bounds on how much of the merged stream is resolved at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineWindow {
    pub from: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub max_occurrences: usize,
}

impl TimelineWindow {
    #[must_use]
    pub fn new(from: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self {
            from,
            until,
            max_occurrences: TimelineConfig::default().max_occurrences,
        }
    }

    #[must_use]
    pub fn with_max_occurrences(mut self, max_occurrences: usize) -> Self {
        self.max_occurrences = max_occurrences;
        self
    }

    /// Window of the configured horizon starting at `from`.
    #[must_use]
    pub fn from_settings(from: DateTime<Utc>, config: &TimelineConfig) -> Self {
        let until = from
            .checked_add_signed(config.horizon())
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            from,
            until,
            max_occurrences: config.max_occurrences,
        }
    }

    fn validate(&self) -> ServiceResult<()> {
        if self.until <= self.from {
            return Err(ServiceError::InvalidWindow {
                from: self.from,
                until: self.until,
            });
        }
        Ok(())
    }
}

/// ## Summary
/// Pulls occurrences starting before `window.until`, up to
/// `window.max_occurrences` of them.
///
/// Occurrences already running at `window.from` are kept whole.
#[must_use]
pub fn collect_window<'a>(
    occurrences: impl Iterator<Item = ScheduledOccurrence<'a>>,
    window: &TimelineWindow,
) -> Vec<Occurrence> {
    occurrences
        .take_while(|scheduled| scheduled.start < window.until)
        .take(window.max_occurrences)
        .map(ScheduledOccurrence::into_occurrence)
        .collect()
}

/// ## Summary
/// Merges `sequences` from `window.from`, bounds the stream to `window`, and
/// resolves overlaps.
///
/// ## Errors
/// Returns `ServiceError::InvalidWindow` if `window.until` is not after
/// `window.from`.
pub fn resolve_timeline(
    sequences: &[Sequence],
    window: &TimelineWindow,
    resolver: &mut TimeZoneResolver,
) -> ServiceResult<Vec<Occurrence>> {
    window.validate()?;

    let merged = RecurrenceIterator::with_resolver(sequences, Some(window.from), resolver);
    let batch = collect_window(merged, window);

    if batch.len() == window.max_occurrences {
        tracing::warn!(
            max_occurrences = window.max_occurrences,
            "Timeline window truncated at occurrence limit"
        );
    }
    tracing::debug!(
        from = %window.from,
        until = %window.until,
        occurrences = batch.len(),
        "Collected timeline window"
    );

    resolve_overrides(&batch)
}
