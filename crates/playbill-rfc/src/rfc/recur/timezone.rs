//! Timezone resolution and conversion between wall-clock and absolute time.
//!
//! Uses ICU4X for Windows timezone ID to IANA mapping and timezone canonicalization.
//! Recurrence arithmetic runs on `DateTime<rrule::Tz>` in the sequence's zone,
//! so each recurrence gets the offset in effect on its own date.

use chrono::{DateTime, LocalResult, NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use icu::time::zone::WindowsParser;
use icu::time::zone::iana::IanaParserExtended;
use std::collections::HashMap;
use std::str::FromStr;

/// Error during timezone conversion.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    /// Unknown or invalid timezone identifier.
    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    /// Non-existent time during DST gap.
    #[error("Non-existent time (DST gap): {0}")]
    NonExistentTime(String),
}

/// Resolver for timezone identifiers.
///
/// Maintains a cache of resolved timezones and a fallback zone for
/// sequences authored without a TZID.
#[derive(Debug, Clone)]
pub struct TimeZoneResolver {
    /// Cache of resolved IANA timezones by TZID.
    cache: HashMap<String, Tz>,
    fallback: Tz,
}

impl TimeZoneResolver {
    /// Creates a resolver that falls back to UTC.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
            fallback: Tz::UTC,
        }
    }

    /// ## Summary
    /// Creates a resolver whose fallback zone is `tzid`.
    ///
    /// ## Errors
    /// Returns `ConversionError::UnknownTimezone` if `tzid` cannot be resolved.
    pub fn with_fallback(tzid: &str) -> Result<Self, ConversionError> {
        let mut resolver = Self::new();
        resolver.fallback = resolver.resolve(tzid)?;
        Ok(resolver)
    }

    #[must_use]
    pub fn fallback(&self) -> Tz {
        self.fallback
    }

    /// ## Summary
    /// Resolves a timezone identifier to a `chrono_tz::Tz`.
    ///
    /// Windows names, IANA aliases and `/mozilla.org/` style prefixes are
    /// normalized before lookup.
    ///
    /// ## Errors
    ///
    /// Returns `ConversionError::UnknownTimezone` if the TZID cannot be resolved.
    ///
    /// ## Side Effects
    ///
    /// Caches successful resolutions to avoid repeated parsing.
    pub fn resolve(&mut self, tzid: &str) -> Result<Tz, ConversionError> {
        if let Some(tz) = self.cache.get(tzid) {
            return Ok(*tz);
        }

        let normalized = normalize_tzid(tzid);

        let tz = Tz::from_str(&normalized)
            .map_err(|_e| ConversionError::UnknownTimezone(tzid.to_string()))?;

        self.cache.insert(tzid.to_string(), tz);

        Ok(tz)
    }

    /// ## Summary
    /// Resolves an optional TZID, using the fallback zone when it is absent
    /// or blank.
    ///
    /// ## Errors
    /// Returns `ConversionError::UnknownTimezone` for a TZID that is present
    /// but cannot be resolved.
    pub fn resolve_or_fallback(&mut self, tzid: Option<&str>) -> Result<Tz, ConversionError> {
        match tzid.map(str::trim) {
            Some(tzid) if !tzid.is_empty() => self.resolve(tzid),
            _ => Ok(self.fallback),
        }
    }
}

impl Default for TimeZoneResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalizes common calendar timezone identifiers to IANA names.
///
/// Uses ICU4X for Windows timezone ID mapping and IANA canonicalization.
fn normalize_tzid(tzid: &str) -> String {
    let stripped = tzid
        .strip_prefix("/mozilla.org/")
        .or_else(|| tzid.strip_prefix("/softwarestudio.org/"))
        .unwrap_or(tzid);

    let windows_parser = WindowsParser::new();
    if let Some(tz) = windows_parser.parse(stripped, None) {
        let iana_parser = IanaParserExtended::new();
        for entry in iana_parser.iter() {
            if entry.time_zone == tz {
                return entry.canonical.to_string();
            }
        }
    }

    // Handles aliases like Europe/Kiev -> Europe/Kyiv
    let iana_parser = IanaParserExtended::new();
    let parsed = iana_parser.parse(stripped);
    if parsed.time_zone != icu::time::TimeZone::UNKNOWN {
        return parsed.canonical.to_string();
    }

    stripped.to_string()
}

/// ## Summary
/// Interprets `local_time` as wall-clock time in `tz`.
///
/// A DST fold resolves to the earlier instant.
///
/// ## Errors
/// Returns `ConversionError::NonExistentTime` if the time falls in a DST gap.
pub fn localize(local_time: NaiveDateTime, tz: Tz) -> Result<DateTime<Utc>, ConversionError> {
    match tz.from_local_datetime(&local_time) {
        LocalResult::None => Err(ConversionError::NonExistentTime(format!(
            "{local_time} in timezone {tz}"
        ))),
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(dt1, _dt2) => Ok(dt1.with_timezone(&Utc)),
    }
}

/// ## Summary
/// Like [`localize`], but a time inside a DST gap is shifted forward by one
/// hour and retried.
///
/// ## Errors
/// Returns an error only if the shifted time is still unrepresentable.
pub fn localize_lenient(
    local_time: NaiveDateTime,
    tz: Tz,
) -> Result<DateTime<Utc>, ConversionError> {
    match localize(local_time, tz) {
        Err(ConversionError::NonExistentTime(_)) => localize(local_time + TimeDelta::hours(1), tz),
        other => other,
    }
}

/// Moves an absolute instant into the zoned axis recurrence rules run on.
#[must_use]
pub fn to_rule_time(instant: DateTime<Utc>, tz: Tz) -> DateTime<rrule::Tz> {
    instant.with_timezone(&rrule::Tz::Tz(tz))
}

/// Moves a recurrence result back onto the absolute axis.
#[must_use]
pub fn from_rule_time(rule_time: &DateTime<rrule::Tz>) -> DateTime<Utc> {
    rule_time.with_timezone(&Utc)
}

/// ## Summary
/// Places an authored wall-clock value on the recurrence axis of `tz`.
///
/// ## Errors
/// Returns an error if the value cannot be represented in `tz`.
pub fn local_to_rule_time(
    local_time: NaiveDateTime,
    tz: Tz,
) -> Result<DateTime<rrule::Tz>, ConversionError> {
    localize_lenient(local_time, tz).map(|utc| to_rule_time(utc, tz))
}
