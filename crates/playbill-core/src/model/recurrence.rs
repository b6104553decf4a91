use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

/// ## Summary
/// Recurrence frequency as persisted on a sequence's rule.
///
/// Names outside the supported set deserialize as `Unsupported` so the rule
/// can be rejected per sequence instead of failing the whole record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Yearly,
    Monthly,
    Weekly,
    Daily,
    Hourly,
    Minutely,
    Secondly,
    #[serde(other)]
    Unsupported,
}

impl Frequency {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yearly => "yearly",
            Self::Monthly => "monthly",
            Self::Weekly => "weekly",
            Self::Daily => "daily",
            Self::Hourly => "hourly",
            Self::Minutely => "minutely",
            Self::Secondly => "secondly",
            Self::Unsupported => "unsupported",
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Two-letter weekday codes used by `byday`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeekDay {
    #[serde(rename = "MO")]
    Monday,
    #[serde(rename = "TU")]
    Tuesday,
    #[serde(rename = "WE")]
    Wednesday,
    #[serde(rename = "TH")]
    Thursday,
    #[serde(rename = "FR")]
    Friday,
    #[serde(rename = "SA")]
    Saturday,
    #[serde(rename = "SU")]
    Sunday,
}

impl WeekDay {
    #[must_use]
    pub const fn to_chrono(self) -> chrono::Weekday {
        match self {
            Self::Monday => chrono::Weekday::Mon,
            Self::Tuesday => chrono::Weekday::Tue,
            Self::Wednesday => chrono::Weekday::Wed,
            Self::Thursday => chrono::Weekday::Thu,
            Self::Friday => chrono::Weekday::Fri,
            Self::Saturday => chrono::Weekday::Sat,
            Self::Sunday => chrono::Weekday::Sun,
        }
    }
}

/// ## Summary
/// A persisted recurrence definition.
///
/// Every field is optional so that an empty object round-trips as an empty
/// rule, which callers treat the same as having no rule at all. Wall-clock
/// fields (`dtstart`, `until`) are interpreted in the owning sequence's zone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecurrenceRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freq: Option<Frequency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byday: Option<Vec<WeekDay>>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "one_or_many"
    )]
    pub byhour: Option<Vec<u8>>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "one_or_many"
    )]
    pub byminute: Option<Vec<u8>>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "one_or_many"
    )]
    pub bymonthday: Option<Vec<i8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dtstart: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tzid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<NaiveDateTime>,
}

/// Reads a `by*` constraint written either as a bare number or a list.
fn one_or_many<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        One(T),
        Many(Vec<T>),
    }

    Ok(
        Option::<OneOrMany<T>>::deserialize(deserializer)?.map(|value| match value {
            OneOrMany::One(single) => vec![single],
            OneOrMany::Many(list) => list,
        }),
    )
}

impl RecurrenceRule {
    #[must_use]
    pub fn new(freq: Frequency) -> Self {
        Self {
            freq: Some(freq),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_interval(mut self, interval: u16) -> Self {
        self.interval = Some(interval);
        self
    }

    #[must_use]
    pub fn with_byday(mut self, days: impl Into<Vec<WeekDay>>) -> Self {
        self.byday = Some(days.into());
        self
    }

    #[must_use]
    pub fn with_byhour(mut self, hours: impl Into<Vec<u8>>) -> Self {
        self.byhour = Some(hours.into());
        self
    }

    #[must_use]
    pub fn with_byminute(mut self, minutes: impl Into<Vec<u8>>) -> Self {
        self.byminute = Some(minutes.into());
        self
    }

    #[must_use]
    pub fn with_bymonthday(mut self, days: impl Into<Vec<i8>>) -> Self {
        self.bymonthday = Some(days.into());
        self
    }

    #[must_use]
    pub fn with_dtstart(mut self, dtstart: NaiveDateTime) -> Self {
        self.dtstart = Some(dtstart);
        self
    }

    #[must_use]
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    #[must_use]
    pub fn with_until(mut self, until: NaiveDateTime) -> Self {
        self.until = Some(until);
        self
    }

    /// True when no field is set, i.e. the rule was persisted as `{}`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    #[must_use]
    pub fn interval(&self) -> u16 {
        self.interval.unwrap_or(1)
    }
}
