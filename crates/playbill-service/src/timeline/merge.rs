//! Lazy merge of every sequence's recurrences into one start-ordered stream.

use std::cmp::Ordering;

use chrono::{DateTime, TimeDelta, Utc};
use playbill_core::model::{Occurrence, Sequence};
use playbill_rfc::error::RfcError;
use playbill_rfc::rfc::recur::{
    RuleExpansion, RuleOccurrences, TimeZoneResolver, build_rule_expansion, from_rule_time,
    localize_lenient, to_rule_time,
};
use uuid::Uuid;

use crate::error::ServiceResult;

/// Sort key shared by cursors and emitted occurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartKey {
    pub start: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// ## Summary
/// Orders by `start` ascending with a missing start after every real one.
///
/// Equal starts (including two missing ones) put the more recently updated
/// key first.
#[must_use]
pub fn compare_start(a: &StartKey, b: &StartKey) -> Ordering {
    let by_start = match (a.start, b.start) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_start.then_with(|| b.updated_at.cmp(&a.updated_at))
}

impl Ord for StartKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_start(self, other)
    }
}

impl PartialOrd for StartKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// ## Summary
/// Picks the first recurrence worth emitting at `at`.
///
/// The latest recurrence at or before `at` is kept while it is still running
/// (`start + duration > at`). Otherwise the next recurrence strictly after
/// `at` is used.
#[must_use]
pub fn current_or_next_start(
    expansion: &RuleExpansion,
    at: &DateTime<rrule::Tz>,
    duration: TimeDelta,
) -> Option<DateTime<rrule::Tz>> {
    match expansion.latest_at_or_before(at) {
        Some(previous) if from_rule_time(&previous) + duration > from_rule_time(at) => {
            Some(previous)
        }
        _ => expansion.next_after(at),
    }
}

/// One occurrence yielded by [`RecurrenceIterator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledOccurrence<'a> {
    pub sequence: &'a Sequence,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledOccurrence<'_> {
    /// Occurrences share the id of their sequence.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.sequence.id
    }

    #[must_use]
    pub fn into_occurrence(self) -> Occurrence {
        Occurrence::for_sequence(self.sequence.id, self.start, self.end, self.updated_at)
    }
}

impl From<ScheduledOccurrence<'_>> for Occurrence {
    fn from(scheduled: ScheduledOccurrence<'_>) -> Self {
        scheduled.into_occurrence()
    }
}

/// Per-sequence iteration state.
struct RuleCursor<'a> {
    sequence: &'a Sequence,
    start: Option<DateTime<Utc>>,
    duration: TimeDelta,
    /// Recurrences after `start`; `None` for a one-shot.
    upcoming: Option<RuleOccurrences>,
}

impl<'a> RuleCursor<'a> {
    /// ## Summary
    /// Builds the cursor for `sequence`, positioned on its first occurrence
    /// at or after `not_before`.
    ///
    /// Returns `Ok(None)` when the sequence has nothing left to emit.
    ///
    /// ## Errors
    /// Fails if the sequence is invalid, its zone is unknown, or its rule
    /// cannot be expanded.
    fn open(
        sequence: &'a Sequence,
        not_before: Option<DateTime<Utc>>,
        resolver: &mut TimeZoneResolver,
    ) -> ServiceResult<Option<Self>> {
        sequence.validate()?;

        let tz = resolver
            .resolve_or_fallback(sequence.tzid.as_deref())
            .map_err(RfcError::from)?;
        let start = localize_lenient(sequence.start_datetime, tz).map_err(RfcError::from)?;
        let duration = match sequence.end_datetime {
            Some(end) => localize_lenient(end, tz).map_err(RfcError::from)? - start,
            None => TimeDelta::zero(),
        };

        // The authored window counts until its end passes the lower bound.
        let authored_open = not_before.is_none_or(|bound| start + duration > bound);

        let Some(rule) = sequence.recurrence() else {
            return Ok(authored_open.then_some(Self {
                sequence,
                start: Some(start),
                duration,
                upcoming: None,
            }));
        };

        let expansion =
            build_rule_expansion(rule, sequence.start_datetime, tz).map_err(RfcError::from)?;

        let position = match not_before {
            _ if authored_open => Some(to_rule_time(start, tz)),
            Some(bound) => current_or_next_start(&expansion, &to_rule_time(bound, tz), duration),
            None => None,
        };
        let Some(position) = position else {
            return Ok(None);
        };

        Ok(Some(Self {
            sequence,
            start: Some(from_rule_time(&position)),
            duration,
            upcoming: Some(expansion.occurrences_after(&position)),
        }))
    }

    fn key(&self) -> StartKey {
        StartKey {
            start: self.start,
            updated_at: self.sequence.updated_at,
        }
    }

    fn advance(&mut self) {
        self.start = self
            .upcoming
            .as_mut()
            .and_then(Iterator::next)
            .map(|position| from_rule_time(&position));
        tracing::trace!(sequence_id = %self.sequence.id, start = ?self.start, "Advanced cursor");
    }
}

/// ## Summary
/// Pull-based merge of every sequence's occurrences in `start` order.
///
/// Unbounded rules make the iterator infinite; callers bound consumption
/// themselves (see [`super::collect_window`]).
pub struct RecurrenceIterator<'a> {
    /// Live cursors, kept sorted by [`compare_start`].
    cursors: Vec<RuleCursor<'a>>,
}

impl<'a> RecurrenceIterator<'a> {
    /// Uses a resolver that falls back to UTC for sequences with no TZID.
    #[must_use]
    pub fn new(sequences: &'a [Sequence], not_before: Option<DateTime<Utc>>) -> Self {
        Self::with_resolver(sequences, not_before, &mut TimeZoneResolver::new())
    }

    /// ## Summary
    /// Opens one cursor per sequence.
    ///
    /// Sequences that fail to open are logged and left out; they never fail
    /// the batch.
    #[must_use]
    pub fn with_resolver(
        sequences: &'a [Sequence],
        not_before: Option<DateTime<Utc>>,
        resolver: &mut TimeZoneResolver,
    ) -> Self {
        let mut cursors: Vec<RuleCursor<'a>> = sequences
            .iter()
            .filter_map(
                |sequence| match RuleCursor::open(sequence, not_before, resolver) {
                    Ok(cursor) => cursor,
                    Err(error) => {
                        tracing::warn!(
                            sequence_id = %sequence.id,
                            %error,
                            "Dropping sequence from recurrence iteration"
                        );
                        None
                    }
                },
            )
            .collect();

        cursors.sort_by_key(RuleCursor::key);

        tracing::debug!(
            sequences = sequences.len(),
            cursors = cursors.len(),
            "Opened recurrence iterator"
        );

        Self { cursors }
    }
}

impl<'a> Iterator for RecurrenceIterator<'a> {
    type Item = ScheduledOccurrence<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursors.is_empty() {
            return None;
        }
        let mut cursor = self.cursors.remove(0);
        let start = cursor.start?;

        let emitted = ScheduledOccurrence {
            sequence: cursor.sequence,
            start,
            end: start + cursor.duration,
            updated_at: cursor.sequence.updated_at,
        };

        cursor.advance();
        if cursor.start.is_some() {
            // Ahead of equal keys, as a stable re-sort would leave it.
            let key = cursor.key();
            let index = self.cursors.partition_point(|other| other.key() < key);
            self.cursors.insert(index, cursor);
        }

        Some(emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use playbill_core::model::{Frequency, RecurrenceRule, WeekDay};

    fn naive(s: &str) -> NaiveDateTime {
        s.parse().unwrap()
    }

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn one_shot(start: &str, end: &str, updated: &str) -> Sequence {
        Sequence::new(naive(start), utc(updated)).with_end(naive(end))
    }

    fn starts<'a>(iter: impl Iterator<Item = ScheduledOccurrence<'a>>, n: usize) -> Vec<DateTime<Utc>> {
        iter.take(n).map(|o| o.start).collect()
    }

    #[test_log::test]
    fn test_compare_start_orders_missing_last() {
        let older = utc("2018-01-01T00:00:00Z");
        let newer = utc("2018-01-02T00:00:00Z");
        let early = StartKey {
            start: Some(utc("2018-01-07T08:00:00Z")),
            updated_at: older,
        };
        let missing = StartKey {
            start: None,
            updated_at: newer,
        };

        assert_eq!(compare_start(&early, &missing), Ordering::Less);
        assert_eq!(compare_start(&missing, &early), Ordering::Greater);

        let tied = StartKey {
            updated_at: newer,
            ..early
        };
        assert_eq!(compare_start(&tied, &early), Ordering::Less);

        let missing_older = StartKey {
            start: None,
            updated_at: older,
        };
        assert_eq!(compare_start(&missing, &missing_older), Ordering::Less);
        assert_eq!(compare_start(&missing, &missing), Ordering::Equal);
    }

    #[test_log::test]
    fn test_current_or_next_start() {
        // Mondays and Tuesdays at 08:00, from Monday 2018-01-01.
        let rule = RecurrenceRule::new(Frequency::Weekly)
            .with_byday([WeekDay::Monday, WeekDay::Tuesday]);
        let expansion =
            build_rule_expansion(&rule, naive("2018-01-01T08:00:00"), chrono_tz::Tz::UTC).unwrap();
        let tz = chrono_tz::Tz::UTC;

        let during = to_rule_time(utc("2018-01-02T08:07:06Z"), tz);
        let current = current_or_next_start(&expansion, &during, TimeDelta::minutes(10));
        assert_eq!(
            current.map(|d| from_rule_time(&d)),
            Some(utc("2018-01-02T08:00:00Z"))
        );

        let next = current_or_next_start(&expansion, &during, TimeDelta::minutes(5));
        assert_eq!(
            next.map(|d| from_rule_time(&d)),
            Some(utc("2018-01-08T08:00:00Z"))
        );

        let exact = to_rule_time(utc("2018-01-02T08:00:00Z"), tz);
        let current = current_or_next_start(&expansion, &exact, TimeDelta::minutes(10));
        assert_eq!(
            current.map(|d| from_rule_time(&d)),
            Some(utc("2018-01-02T08:00:00Z"))
        );
    }

    #[test_log::test]
    fn test_empty_input() {
        assert_eq!(RecurrenceIterator::new(&[], None).next(), None);
    }

    #[test_log::test]
    fn test_one_shots_in_start_order() {
        let sequences = [
            one_shot("2018-01-03T10:00:00", "2018-01-03T11:00:00", "2018-01-01T00:00:00Z"),
            one_shot("2018-01-01T10:00:00", "2018-01-01T11:00:00", "2018-01-01T00:00:00Z"),
            one_shot("2018-01-02T10:00:00", "2018-01-02T11:00:00", "2018-01-01T00:00:00Z"),
        ];

        let yielded: Vec<_> = RecurrenceIterator::new(&sequences, None).collect();

        assert_eq!(yielded.len(), 3);
        assert_eq!(yielded[0].id(), sequences[1].id);
        assert_eq!(yielded[1].id(), sequences[2].id);
        assert_eq!(yielded[2].id(), sequences[0].id);
        assert_eq!(yielded[0].end, utc("2018-01-01T11:00:00Z"));
    }

    #[test_log::test]
    fn test_elapsed_one_shots_yield_nothing() {
        let sequences = [
            one_shot("2018-01-01T10:00:00", "2018-01-01T11:00:00", "2018-01-01T00:00:00Z"),
            one_shot("2018-01-02T10:00:00", "2018-01-02T11:00:00", "2018-01-01T00:00:00Z"),
        ];

        let mut iter = RecurrenceIterator::new(&sequences, Some(utc("2018-01-02T11:00:00Z")));
        assert_eq!(iter.next(), None);
    }

    #[test_log::test]
    fn test_started_one_shot_still_surfaces() {
        let sequences = [one_shot(
            "2018-01-01T10:00:00",
            "2018-01-01T11:00:00",
            "2018-01-01T00:00:00Z",
        )];

        let yielded: Vec<_> =
            RecurrenceIterator::new(&sequences, Some(utc("2018-01-01T10:30:00Z"))).collect();
        assert_eq!(yielded.len(), 1);
        assert_eq!(yielded[0].start, utc("2018-01-01T10:00:00Z"));
    }

    #[test_log::test]
    fn test_weekly_rule_from_sunday_midnight() {
        // 2018-01-07 is a Sunday
        let sequences = [
            one_shot("2018-01-07T08:00:00", "2018-01-07T09:00:00", "2018-01-01T00:00:00Z")
                .with_recurrence_rule(
                    RecurrenceRule::new(Frequency::Weekly)
                        .with_byday([WeekDay::Sunday, WeekDay::Tuesday]),
                ),
        ];

        let iter = RecurrenceIterator::new(&sequences, Some(utc("2018-01-07T00:00:00Z")));

        assert_eq!(
            starts(iter, 3),
            vec![
                utc("2018-01-07T08:00:00Z"),
                utc("2018-01-09T08:00:00Z"),
                utc("2018-01-14T08:00:00Z"),
            ]
        );
    }

    #[test_log::test]
    fn test_multiple_rules_interleave() {
        let sequences = [
            one_shot("2018-01-01T09:00:00", "2018-01-01T10:00:00", "2018-01-01T00:00:00Z")
                .with_recurrence_rule(RecurrenceRule::new(Frequency::Daily)),
            one_shot("2018-01-07T08:00:00", "2018-01-07T09:00:00", "2018-01-01T00:00:00Z")
                .with_recurrence_rule(
                    RecurrenceRule::new(Frequency::Weekly)
                        .with_byday([WeekDay::Sunday, WeekDay::Tuesday]),
                ),
        ];
        let daily = sequences[0].id;
        let weekly = sequences[1].id;

        let yielded: Vec<_> = RecurrenceIterator::new(&sequences, Some(utc("2018-01-07T00:00:00Z")))
            .take(6)
            .map(|o| (o.id(), o.start))
            .collect();

        assert_eq!(
            yielded,
            vec![
                (weekly, utc("2018-01-07T08:00:00Z")),
                (daily, utc("2018-01-07T09:00:00Z")),
                (daily, utc("2018-01-08T09:00:00Z")),
                (weekly, utc("2018-01-09T08:00:00Z")),
                (daily, utc("2018-01-09T09:00:00Z")),
                (daily, utc("2018-01-10T09:00:00Z")),
            ]
        );
    }

    #[test_log::test]
    fn test_equal_starts_yield_newest_first() {
        let sequences = [
            one_shot("2018-01-01T10:00:00", "2018-01-01T11:00:00", "2018-01-01T00:00:00Z"),
            one_shot("2018-01-01T10:00:00", "2018-01-01T10:30:00", "2018-01-02T00:00:00Z"),
        ];

        let yielded: Vec<_> = RecurrenceIterator::new(&sequences, None).collect();

        assert_eq!(yielded[0].id(), sequences[1].id);
        assert_eq!(yielded[1].id(), sequences[0].id);
    }

    #[test_log::test]
    fn test_recurring_ties_keep_newest_first() {
        let rule = RecurrenceRule::new(Frequency::Daily);
        let sequences = [
            one_shot("2018-01-01T10:00:00", "2018-01-01T11:00:00", "2018-01-01T00:00:00Z")
                .with_recurrence_rule(rule.clone()),
            one_shot("2018-01-01T10:00:00", "2018-01-01T11:00:00", "2018-01-05T00:00:00Z")
                .with_recurrence_rule(rule),
        ];

        let ids: Vec<_> = RecurrenceIterator::new(&sequences, None)
            .take(4)
            .map(|o| o.id())
            .collect();

        assert_eq!(
            ids,
            vec![
                sequences[1].id,
                sequences[0].id,
                sequences[1].id,
                sequences[0].id
            ]
        );
    }

    #[test_log::test]
    fn test_open_ended_one_shot_has_zero_duration() {
        let sequences = [Sequence::new(
            naive("2018-01-01T10:00:00"),
            utc("2018-01-01T00:00:00Z"),
        )];

        let yielded: Vec<_> = RecurrenceIterator::new(&sequences, None).collect();
        assert_eq!(yielded[0].start, yielded[0].end);
    }

    #[test_log::test]
    fn test_sequence_timezones() {
        let sequences = [
            one_shot("2017-01-01T01:00:00", "2017-01-01T02:00:00", "2017-01-01T00:00:00Z")
                .with_tzid("America/Los_Angeles"),
            one_shot("2017-01-01T03:00:00", "2017-01-01T04:00:00", "2017-01-01T00:00:00Z")
                .with_tzid("America/New_York"),
        ];

        let yielded: Vec<_> = RecurrenceIterator::new(&sequences, None).collect();

        assert_eq!(yielded[0].id(), sequences[1].id);
        assert_eq!(yielded[0].start, utc("2017-01-01T08:00:00Z"));
        assert_eq!(yielded[1].id(), sequences[0].id);
        assert_eq!(yielded[1].start, utc("2017-01-01T09:00:00Z"));
    }

    #[test_log::test]
    fn test_authored_start_off_rule() {
        // Wednesday start, recurring on Sundays.
        let sequences = [
            one_shot("2018-01-03T12:00:00", "2018-01-03T13:00:00", "2018-01-01T00:00:00Z")
                .with_recurrence_rule(
                    RecurrenceRule::new(Frequency::Weekly).with_byday([WeekDay::Sunday]),
                ),
        ];

        let iter = RecurrenceIterator::new(&sequences, None);

        assert_eq!(
            starts(iter, 3),
            vec![
                utc("2018-01-03T12:00:00Z"),
                utc("2018-01-07T12:00:00Z"),
                utc("2018-01-14T12:00:00Z"),
            ]
        );
    }

    #[test_log::test]
    fn test_long_running_recurrence_in_progress() {
        // Daily 09:00-17:00 in New York; bound is 11:00 EDT on a Thursday.
        let sequences = [one_shot(
            "2017-01-02T09:00:00",
            "2017-01-02T17:00:00",
            "2017-01-01T00:00:00Z",
        )
        .with_tzid("America/New_York")
        .with_recurrence_rule(RecurrenceRule::new(Frequency::Daily))];

        let yielded: Vec<_> = RecurrenceIterator::new(&sequences, Some(utc("2017-06-01T15:00:00Z")))
            .take(2)
            .collect();

        assert_eq!(yielded[0].start, utc("2017-06-01T13:00:00Z"));
        assert_eq!(yielded[0].end, utc("2017-06-01T21:00:00Z"));
        assert_eq!(yielded[1].start, utc("2017-06-02T13:00:00Z"));
    }

    #[test_log::test]
    fn test_recurrence_offsets_follow_dst() {
        let sequences = [one_shot(
            "2017-03-01T09:00:00",
            "2017-03-01T10:00:00",
            "2017-01-01T00:00:00Z",
        )
        .with_tzid("America/New_York")
        .with_recurrence_rule(RecurrenceRule::new(Frequency::Daily))];

        let iter = RecurrenceIterator::new(&sequences, Some(utc("2017-03-11T00:00:00Z")));

        assert_eq!(
            starts(iter, 2),
            vec![utc("2017-03-11T14:00:00Z"), utc("2017-03-12T13:00:00Z")]
        );
    }

    #[test_log::test]
    fn test_monthly_window_still_open() {
        let sequences = [one_shot(
            "2018-01-01T00:00:00",
            "2018-01-20T00:00:00",
            "2018-01-01T00:00:00Z",
        )
        .with_recurrence_rule(RecurrenceRule::new(Frequency::Monthly).with_bymonthday([1_i8]))];

        let iter = RecurrenceIterator::new(&sequences, Some(utc("2018-03-10T00:00:00Z")));

        assert_eq!(
            starts(iter, 2),
            vec![utc("2018-03-01T00:00:00Z"), utc("2018-04-01T00:00:00Z")]
        );
    }

    #[test_log::test]
    fn test_counted_rule_is_exhausted() {
        let sequences = [one_shot(
            "2018-01-01T09:00:00",
            "2018-01-01T10:00:00",
            "2018-01-01T00:00:00Z",
        )
        .with_recurrence_rule(RecurrenceRule::new(Frequency::Daily).with_count(2))];

        let yielded: Vec<_> = RecurrenceIterator::new(&sequences, None).collect();

        assert_eq!(yielded.len(), 2);
        assert_eq!(yielded[1].start, utc("2018-01-02T09:00:00Z"));
    }

    #[test_log::test]
    fn test_malformed_sequences_are_dropped() {
        let sequences = [
            one_shot("2018-01-01T09:00:00", "2018-01-01T10:00:00", "2018-01-01T00:00:00Z")
                .with_tzid("Not/AZone"),
            one_shot("2018-01-01T09:00:00", "2018-01-01T10:00:00", "2018-01-01T00:00:00Z")
                .with_recurrence_rule(RecurrenceRule::new(Frequency::Daily).with_byhour([25_u8])),
            one_shot("2018-01-01T09:00:00", "2018-01-01T08:00:00", "2018-01-01T00:00:00Z"),
            one_shot("2018-01-01T12:00:00", "2018-01-01T13:00:00", "2018-01-01T00:00:00Z"),
        ];

        let yielded: Vec<_> = RecurrenceIterator::new(&sequences, None).collect();

        assert_eq!(yielded.len(), 1);
        assert_eq!(yielded[0].id(), sequences[3].id);
    }

    #[test_log::test]
    fn test_long_running_rule_steps_forward() {
        let sequences = [
            one_shot("2017-01-01T00:00:00", "2017-01-01T00:30:00", "2017-01-01T00:00:00Z")
                .with_recurrence_rule(RecurrenceRule::new(Frequency::Hourly)),
        ];

        let iter = RecurrenceIterator::new(&sequences, Some(utc("2018-01-01T00:45:00Z")));
        let yielded = starts(iter, 50);

        assert_eq!(yielded.len(), 50);
        assert_eq!(yielded[0], utc("2018-01-01T01:00:00Z"));
        for pair in yielded.windows(2) {
            assert_eq!(pair[1] - pair[0], TimeDelta::hours(1));
        }
    }

    #[test_log::test]
    fn test_malformed_persisted_rule_drops_only_its_sequence() {
        let sequences: Vec<Sequence> = serde_json::from_str(
            r#"[
                {
                    "id": "6f1c3c56-7c1e-4c55-9d6f-0a7f2d4b9e01",
                    "start_datetime": "2018-01-01T09:00:00",
                    "end_datetime": "2018-01-01T10:00:00",
                    "updated_at": "2018-01-01T00:00:00Z",
                    "recurrence_rule": { "freq": "daily", "byhour": 9 }
                },
                {
                    "id": "0b8e5d8a-2f4e-4c1b-8a0e-3d9c6f7a1b02",
                    "start_datetime": "2018-01-01T12:00:00",
                    "updated_at": "2018-01-02T00:00:00Z",
                    "recurrence_rule": { "freq": "fortnightly" }
                }
            ]"#,
        )
        .unwrap();

        let yielded: Vec<_> = RecurrenceIterator::new(&sequences, None).take(3).collect();

        assert_eq!(yielded.len(), 3);
        assert!(yielded.iter().all(|o| o.id() == sequences[0].id));
        assert_eq!(yielded[1].start, utc("2018-01-02T09:00:00Z"));
    }

    #[test_log::test]
    fn test_into_occurrence_carries_sequence() {
        let sequences = [one_shot(
            "2018-01-01T09:00:00",
            "2018-01-01T10:00:00",
            "2018-01-01T00:00:00Z",
        )];

        let occurrence: Occurrence = RecurrenceIterator::new(&sequences, None)
            .next()
            .unwrap()
            .into();

        assert_eq!(occurrence.id, sequences[0].id);
        assert_eq!(occurrence.sequence_id, Some(sequences[0].id));
        assert_eq!(occurrence.updated_at, sequences[0].updated_at);
        assert!(!occurrence.overridden);
    }
}
