use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::RecurrenceRule;
use crate::error::{CoreError, CoreResult};

/// ## Summary
/// An authored schedulable unit, either one-shot or recurring.
///
/// `start_datetime` and `end_datetime` are wall-clock values in `tzid`.
/// A missing `tzid` means the configured default zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tzid: Option<String>,
    pub start_datetime: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_datetime: Option<NaiveDateTime>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_rule: Option<RecurrenceRule>,
}

impl Sequence {
    #[must_use]
    pub fn new(start_datetime: NaiveDateTime, updated_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: None,
            tzid: None,
            start_datetime,
            end_datetime: None,
            updated_at,
            recurrence_rule: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_tzid(mut self, tzid: impl Into<String>) -> Self {
        self.tzid = Some(tzid.into());
        self
    }

    #[must_use]
    pub fn with_end(mut self, end_datetime: NaiveDateTime) -> Self {
        self.end_datetime = Some(end_datetime);
        self
    }

    #[must_use]
    pub fn with_recurrence_rule(mut self, rule: RecurrenceRule) -> Self {
        self.recurrence_rule = Some(rule);
        self
    }

    /// Returns the rule only if it carries at least one field.
    #[must_use]
    pub fn recurrence(&self) -> Option<&RecurrenceRule> {
        self.recurrence_rule.as_ref().filter(|rule| !rule.is_empty())
    }

    /// ## Errors
    /// Returns `ValidationError` if the authored end precedes the start.
    pub fn validate(&self) -> CoreResult<()> {
        match self.end_datetime {
            Some(end) if end < self.start_datetime => Err(CoreError::ValidationError(format!(
                "sequence {} ends at {end} before it starts at {}",
                self.id, self.start_datetime
            ))),
            _ => Ok(()),
        }
    }
}
