//! Adapter from persisted recurrence rules to `rrule` expansions.

use std::iter::Peekable;

use chrono::{DateTime, NaiveDateTime, TimeDelta};
use chrono_tz::Tz;
use playbill_core::model::{Frequency, RecurrenceRule};
use rrule::{NWeekday, RRule, RRuleSet, RRuleSetIter, Unvalidated};

use super::timezone::{ConversionError, local_to_rule_time};

/// Error while adapting a recurrence rule.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("Recurrence rule has no frequency")]
    MissingFrequency,

    #[error("Invalid recurrence rule: {0}")]
    Invalid(String),

    #[error(transparent)]
    Timezone(#[from] ConversionError),
}

/// ## Summary
/// A validated rule, anchored at its `dtstart` in the sequence's zone.
///
/// All positions are `DateTime<rrule::Tz>` in that zone. `until` is applied
/// here rather than inside `rrule` so it can stay a wall-clock value.
#[derive(Debug, Clone)]
pub struct RuleExpansion {
    rrule_set: RRuleSet,
    dtstart: DateTime<rrule::Tz>,
    until: Option<DateTime<rrule::Tz>>,
}

/// ## Summary
/// Stateful walk over an expansion's recurrences in ascending order.
///
/// Each call to `next` computes a single recurrence step; the walk never
/// restarts from `dtstart`.
#[derive(Debug, Clone)]
pub struct RuleOccurrences {
    inner: Peekable<RRuleSetIter>,
    until: Option<DateTime<rrule::Tz>>,
}

impl Iterator for RuleOccurrences {
    type Item = DateTime<rrule::Tz>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.inner.next()?;
        match self.until {
            Some(until) if next > until => None,
            _ => Some(next),
        }
    }
}

fn map_frequency(freq: Frequency) -> Result<rrule::Frequency, RuleError> {
    Ok(match freq {
        Frequency::Yearly => rrule::Frequency::Yearly,
        Frequency::Monthly => rrule::Frequency::Monthly,
        Frequency::Weekly => rrule::Frequency::Weekly,
        Frequency::Daily => rrule::Frequency::Daily,
        Frequency::Hourly => rrule::Frequency::Hourly,
        Frequency::Minutely => rrule::Frequency::Minutely,
        Frequency::Secondly => rrule::Frequency::Secondly,
        Frequency::Unsupported => {
            return Err(RuleError::Invalid("unsupported frequency".to_owned()));
        }
    })
}

/// ## Summary
/// Normalizes `rule` and builds its expansion.
///
/// The rule's own `tzid` is ignored; wall-clock fields are read in `tz`, the
/// owning sequence's zone. `dtstart` defaults to `sequence_start`.
///
/// ## Errors
/// Returns `RuleError::MissingFrequency` for a rule without `freq`,
/// `RuleError::Invalid` for an unsupported frequency or if `rrule` rejects
/// the rule, or a timezone error if `dtstart` cannot be placed in `tz`.
pub fn build_rule_expansion(
    rule: &RecurrenceRule,
    sequence_start: NaiveDateTime,
    tz: Tz,
) -> Result<RuleExpansion, RuleError> {
    let freq = rule.freq.ok_or(RuleError::MissingFrequency)?;

    let mut rrule: RRule<Unvalidated> = RRule::new(map_frequency(freq)?).interval(rule.interval());
    if let Some(byday) = &rule.byday {
        rrule = rrule.by_weekday(
            byday
                .iter()
                .map(|day| NWeekday::Every(day.to_chrono()))
                .collect(),
        );
    }
    if let Some(byhour) = &rule.byhour {
        rrule = rrule.by_hour(byhour.clone());
    }
    if let Some(byminute) = &rule.byminute {
        rrule = rrule.by_minute(byminute.clone());
    }
    if let Some(bymonthday) = &rule.bymonthday {
        rrule = rrule.by_month_day(bymonthday.clone());
    }
    if let Some(count) = rule.count {
        rrule = rrule.count(count);
    }

    let dtstart = local_to_rule_time(rule.dtstart.unwrap_or(sequence_start), tz)?;
    let until = rule
        .until
        .map(|until| local_to_rule_time(until, tz))
        .transpose()?;

    let rrule_set = rrule
        .build(dtstart)
        .map_err(|err| RuleError::Invalid(err.to_string()))?;

    tracing::trace!(%freq, ?dtstart, tz = %tz, "Built recurrence expansion");

    Ok(RuleExpansion {
        rrule_set,
        dtstart,
        until,
    })
}

impl RuleExpansion {
    /// First recurrence strictly after `position`.
    #[must_use]
    pub fn next_after(&self, position: &DateTime<rrule::Tz>) -> Option<DateTime<rrule::Tz>> {
        let next = self
            .rrule_set
            .clone()
            .after(*position)
            .all(2)
            .dates
            .into_iter()
            .find(|date| date > position)?;

        self.within_until(next)
    }

    /// ## Summary
    /// Walks the recurrences strictly after `position`.
    ///
    /// Skipping up to `position` happens once here; stepping the returned
    /// iterator is then constant work per recurrence.
    #[must_use]
    pub fn occurrences_after(&self, position: &DateTime<rrule::Tz>) -> RuleOccurrences {
        let mut inner = IntoIterator::into_iter(&self.rrule_set).peekable();
        while inner.next_if(|date| date <= position).is_some() {}

        RuleOccurrences {
            inner,
            until: self.until,
        }
    }

    /// ## Summary
    /// Most recent recurrence at or before `position`.
    ///
    /// Searches backwards in windows that double in size, starting at one
    /// hour, until a recurrence is found or the window reaches `dtstart`.
    #[must_use]
    pub fn latest_at_or_before(
        &self,
        position: &DateTime<rrule::Tz>,
    ) -> Option<DateTime<rrule::Tz>> {
        let bound = match self.until {
            Some(until) if until < *position => until,
            _ => *position,
        };
        if bound < self.dtstart {
            return None;
        }

        let mut span = TimeDelta::hours(1);
        loop {
            // `None` means the window reaches back to dtstart.
            let from = bound
                .checked_sub_signed(span)
                .filter(|from| *from > self.dtstart);

            if let Some(found) = self.latest_in_window(from, &bound) {
                return Some(found);
            }
            if from.is_none() {
                return None;
            }
            span = span.checked_mul(2).unwrap_or(TimeDelta::MAX);
        }
    }

    fn latest_in_window(
        &self,
        from: Option<DateTime<rrule::Tz>>,
        bound: &DateTime<rrule::Tz>,
    ) -> Option<DateTime<rrule::Tz>> {
        let upper = bound
            .checked_add_signed(TimeDelta::seconds(1))
            .unwrap_or(*bound);
        let mut latest: Option<DateTime<rrule::Tz>> = None;
        let mut cursor = from;

        loop {
            let mut window = self.rrule_set.clone().before(upper);
            if let Some(cursor) = cursor {
                window = window.after(cursor);
            }
            let result = window.all(u16::MAX);
            let last = result.dates.last().copied();

            if let Some(found) = result.dates.into_iter().rev().find(|date| date <= bound) {
                latest = Some(latest.map_or(found, |latest| latest.max(found)));
            }

            // Page forward when the window held more than one batch.
            match last {
                Some(last) if result.limited && Some(last) != cursor => cursor = Some(last),
                _ => return latest,
            }
        }
    }

    fn within_until(&self, date: DateTime<rrule::Tz>) -> Option<DateTime<rrule::Tz>> {
        match self.until {
            Some(until) if date > until => None,
            _ => Some(date),
        }
    }
}
