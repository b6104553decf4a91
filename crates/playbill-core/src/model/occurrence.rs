use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

/// ## Summary
/// A concrete, dated instance of a sequence on the absolute time axis.
///
/// `overrides` holds the occurrences (or fragments) this one preempted.
/// Each entry spans exactly the interval during which it was shadowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_id: Option<Uuid>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub overridden: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<Occurrence>,
}

impl Occurrence {
    #[must_use]
    pub fn new(
        id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            sequence_id: None,
            start,
            end,
            updated_at,
            overridden: false,
            overrides: Vec::new(),
        }
    }

    /// Occurrence materialized from a sequence; it shares the sequence's id.
    #[must_use]
    pub fn for_sequence(
        sequence_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            sequence_id: Some(sequence_id),
            ..Self::new(sequence_id, start, end, updated_at)
        }
    }

    /// ## Summary
    /// Moves the start boundary and clamps every attached override to it.
    /// Overrides left with no span are discarded.
    pub fn trim_start(&mut self, start: DateTime<Utc>) {
        self.start = start;
        for o in &mut self.overrides {
            o.start = o.start.max(start);
        }
        self.overrides.retain(|o| o.end > o.start);
    }

    /// ## Summary
    /// Moves the end boundary and clamps every attached override to it.
    /// Overrides left with no span are discarded.
    pub fn trim_end(&mut self, end: DateTime<Utc>) {
        self.end = end;
        for o in &mut self.overrides {
            o.end = o.end.min(end);
        }
        self.overrides.retain(|o| o.end > o.start);
    }

    /// Records `overridden` as preempted by `self`. Overrides it carried are
    /// kept on it and also appended here, so the winner lists every layer.
    pub fn add_override(&mut self, overridden: Self) {
        let carried = overridden.overrides.clone();
        self.overrides.push(overridden);
        self.overrides.extend(carried);
    }

    /// ## Errors
    /// Returns `InvalidInterval` if `end` precedes `start`.
    pub fn validate(&self) -> CoreResult<()> {
        if self.end < self.start {
            return Err(CoreError::InvalidInterval {
                id: self.id,
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }
}
