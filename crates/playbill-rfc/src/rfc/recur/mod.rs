//! Recurrence expansion for sequences.
//!
//! `timezone` maps authored wall-clock values onto the absolute axis and back.
//! `rule` turns a persisted rule into something that can answer
//! "next after" and "latest at or before" queries.

mod rule;
mod timezone;

pub use rule::{RuleError, RuleExpansion, RuleOccurrences, build_rule_expansion};
pub use timezone::{
    ConversionError, TimeZoneResolver, from_rule_time, local_to_rule_time, localize,
    localize_lenient, to_rule_time,
};
